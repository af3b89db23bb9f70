//! The legacy registration obfuscation.
//!
//! Old clients hide their `tetrisstart` line behind a XOR keyed on the
//! decimal text of a hash of an IPv4 address and send it as uppercase hex.
//! It protects nothing; it is supported so those clients can connect.

use log::debug;
use std::fmt::Write;
use std::net::IpAddr;

/// Upper bound (exclusive) of the hash values tried when the address-based
/// key does not decode a line.
pub const BRUTE_FORCE_LIMIT: u32 = 35956;

/// Shortest hex line worth decoding: a seed byte plus `tetrisstart `.
pub const MIN_ENCODED_LEN: usize = 26;

const REGISTRATION_PREFIXES: [&str; 2] = ["tetrisstart ", "tetrifaster "];

/// Hash of the four address bytes used as the key.
pub fn ip_hash(ip: [u8; 4]) -> u32 {
    ip[0] as u32 * 54 + ip[1] as u32 * 41 + ip[2] as u32 * 29 + ip[3] as u32 * 17
}

/// The four bytes an address contributes to the key. IPv6 peers use their
/// last four bytes.
pub fn key_bytes(addr: IpAddr) -> [u8; 4] {
    match addr {
        IpAddr::V4(v4) => v4.octets(),
        IpAddr::V6(v6) => {
            let o = v6.octets();
            [o[12], o[13], o[14], o[15]]
        }
    }
}

/// Whether `line` already starts with a registration token.
pub fn is_plain_registration(line: &str) -> bool {
    REGISTRATION_PREFIXES.iter().any(|p| line.starts_with(p))
}

/// Obfuscates a registration line for the server at `ip`.
pub fn encode_registration(message: &str, ip: [u8; 4]) -> String {
    let key = ip_hash(ip).to_string().into_bytes();
    let mut prev: u8 = 0;
    let mut out = String::with_capacity((message.len() + 1) * 2);
    let _ = write!(out, "{:02X}", prev);
    for (i, byte) in message.bytes().enumerate() {
        let next = (((prev as u32 + byte as u32) % 255) as u8) ^ key[i % key.len()];
        let _ = write!(out, "{:02X}", next);
        prev = next;
    }
    out
}

fn hex_bytes(line: &str) -> Option<Vec<u8>> {
    let raw = line.as_bytes();
    raw.chunks_exact(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(text, 16).ok()
        })
        .collect()
}

fn decode_with_key(bytes: &[u8], key: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for (i, pair) in bytes.windows(2).enumerate() {
        let d = ((pair[1] ^ key[i % key.len()]) as u32 + 255 - pair[0] as u32) % 255;
        out.push(d as u8 as char);
    }
    out
}

/// Recovers a registration line. Plain lines pass through unchanged.
/// Otherwise the hex is decoded with the key derived from `ip`, then with
/// every hash below [`BRUTE_FORCE_LIMIT`] for peers behind NAT. Returns
/// `None` when nothing decodes to a registration token.
pub fn decode_registration(line: &str, ip: [u8; 4]) -> Option<String> {
    if is_plain_registration(line) {
        return Some(line.to_string());
    }
    if line.len() < MIN_ENCODED_LEN {
        return None;
    }
    let bytes = hex_bytes(line)?;

    let direct = decode_with_key(&bytes, ip_hash(ip).to_string().as_bytes());
    if is_plain_registration(&direct) {
        return Some(direct);
    }
    let found = (0..BRUTE_FORCE_LIMIT).find_map(|hash| {
        let text = decode_with_key(&bytes, hash.to_string().as_bytes());
        is_plain_registration(&text).then_some((hash, text))
    });
    if let Some((hash, _)) = &found {
        debug!("registration key recovered by search: {}", hash);
    }
    found.map(|(_, text)| text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_hash() {
        assert_eq!(ip_hash([127, 0, 0, 1]), 127 * 54 + 17);
        assert_eq!(ip_hash([0, 0, 0, 0]), 0);
    }

    #[test]
    fn test_roundtrip_with_matching_ip() {
        let ip = [192, 168, 1, 20];
        let encoded = encode_registration("tetrisstart alice 1.13", ip);
        assert!(encoded.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_eq!(
            decode_registration(&encoded, ip).as_deref(),
            Some("tetrisstart alice 1.13")
        );
    }

    #[test]
    fn test_brute_force_recovers_nat_peer() {
        let encoded = encode_registration("tetrifaster bob 1.13", [10, 0, 0, 2]);
        assert_eq!(
            decode_registration(&encoded, [1, 2, 3, 4]).as_deref(),
            Some("tetrifaster bob 1.13")
        );
    }

    #[test]
    fn test_plain_passthrough_and_rejects() {
        assert_eq!(
            decode_registration("tetrisstart carol 1.13", [0; 4]).as_deref(),
            Some("tetrisstart carol 1.13")
        );
        assert_eq!(decode_registration("00AB", [0; 4]), None);
        assert_eq!(decode_registration(&"ZZ".repeat(20), [0; 4]), None);
    }

    #[test]
    fn test_key_bytes_ipv6_uses_tail() {
        let addr: IpAddr = "::ffff:10.1.2.3".parse().unwrap();
        assert_eq!(key_bytes(addr), [10, 1, 2, 3]);
    }
}
