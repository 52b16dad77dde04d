use getrandom::getrandom;

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const REQUEST_SUFFIX_SPACE: u32 = 1_679_616; // 36^4

fn base36_encode_u64(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut chars = Vec::new();
    while value > 0 {
        chars.push(BASE36_ALPHABET[(value % 36) as usize] as char);
        value /= 36;
    }
    chars.into_iter().rev().collect()
}

fn base36_encode_fixed_u32(mut value: u32, width: usize) -> String {
    let mut chars = vec!['0'; width];
    for idx in (0..width).rev() {
        chars[idx] = BASE36_ALPHABET[(value % 36) as usize] as char;
        value /= 36;
    }
    chars.into_iter().collect()
}

/// Mints a short id correlating the log lines of one handler invocation.
/// Falls back to an all-zero suffix if the OS randomness source fails; the id
/// only has to be distinct enough to group log lines, never unique forever.
pub fn new_request_id(now: i64) -> String {
    let timestamp = u64::try_from(now).unwrap_or(0);
    let mut bytes = [0_u8; 4];
    let sample = match getrandom(&mut bytes) {
        Ok(()) => u32::from_le_bytes(bytes) % REQUEST_SUFFIX_SPACE,
        Err(_) => 0,
    };
    format!(
        "req-{}-{}",
        base36_encode_u64(timestamp),
        base36_encode_fixed_u32(sample, 4)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_round_numbers_encode_compactly() {
        assert_eq!(base36_encode_u64(0), "0");
        assert_eq!(base36_encode_u64(35), "z");
        assert_eq!(base36_encode_u64(36), "10");
    }

    #[test]
    fn fixed_width_encoding_pads_with_zeroes() {
        assert_eq!(base36_encode_fixed_u32(0, 4), "0000");
        assert_eq!(base36_encode_fixed_u32(35, 4), "000z");
    }

    #[test]
    fn request_ids_carry_the_timestamp_prefix() {
        let id = new_request_id(36);
        assert!(id.starts_with("req-10-"), "unexpected id {id}");
        assert_eq!(id.len(), "req-10-".len() + 4);
    }
}
