fn output_header() -> &'static str {
    "Spaceflow\nSpaceflow is a file-backed handler runtime for a collaboration platform's GraphQL API."
}

fn print_header() {
    println!("{}\n", output_header());
}

fn run() -> Result<(), String> {
    print_header();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let output = spaceflow::cli::run(args)?;
    println!("{output}");
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
