pub mod diagnostics;
pub mod function_registry;
pub mod output_contract;
pub mod prompt_render;
pub mod routing;
pub mod run_store;
pub mod selector;
pub mod selector_artifacts;
pub mod workspace_access;

pub mod workflow_engine;
