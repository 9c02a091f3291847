use hashbrown::HashMap;
use lazy_static::lazy_static;
use std::sync::Mutex;

lazy_static! {
    static ref REGISTRY: Mutex<HashMap<String, String>> = Mutex::new(HashMap::new());
}

/// Registers a symbolic `name` under a two-character `code`. Rejects (returns `false` without
/// mutating the registry) any code that isn't exactly two characters. There is no deregistration:
/// populate the registry once at startup, before a second thread touches any endpoint.
pub fn register(name: &str, code: &str) -> bool {
    if code.chars().count() != 2 {
        return false;
    }

    REGISTRY.lock().unwrap().insert(name.to_string(), code.to_string());
    true
}

fn resolve(mnemonic: &str) -> String {
    REGISTRY
        .lock()
        .unwrap()
        .get(mnemonic)
        .cloned()
        .unwrap_or_else(|| mnemonic.to_string())
}

/// Encodes a command as `<code>|<arg0>;<arg1>;...;`. Every argument, including the last, is
/// `;`-terminated. `mnemonic` is resolved through the registry first; an unregistered mnemonic is
/// used as-is.
pub fn encode(mnemonic: &str, args: &[&str]) -> Vec<u8> {
    let code = resolve(mnemonic);
    let mut out = String::with_capacity(code.len() + 1 + args.iter().map(|arg| arg.len() + 1).sum::<usize>());

    out.push_str(&code);
    out.push('|');
    for arg in args {
        out.push_str(arg);
        out.push(';');
    }

    out.into_bytes()
}

/// Decodes a command. Never fails: bytes with no `|` are returned whole as the mnemonic with no
/// arguments; otherwise the head up to the first `|` is the mnemonic and the tail is split on `;`,
/// with only empty *trailing* segments discarded (an interior empty argument survives).
pub fn decode(bytes: &[u8]) -> (String, Vec<String>) {
    let text = String::from_utf8_lossy(bytes);

    match text.find('|') {
        None => (text.into_owned(), Vec::new()),
        Some(split_at) => {
            let mnemonic = text[..split_at].to_string();
            let mut args: Vec<String> = text[split_at + 1..].split(';').map(str::to_string).collect();

            while args.last().map_or(false, |arg| arg.is_empty()) {
                args.pop();
            }

            (mnemonic, args)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_terminates_every_argument() {
        assert_eq!(encode("MV", &["100.5", "250.3"]), b"MV|100.5;250.3;".to_vec());
    }

    #[test]
    fn test_decode_splits_mnemonic_and_args() {
        let (mnemonic, args) = decode(b"MV|100.5;250.3;");
        assert_eq!(mnemonic, "MV");
        assert_eq!(args, vec!["100.5".to_string(), "250.3".to_string()]);
    }

    #[test]
    fn test_decode_without_pipe_returns_whole_text_and_no_args() {
        let (mnemonic, args) = decode(b"PING");
        assert_eq!(mnemonic, "PING");
        assert!(args.is_empty());
    }

    #[test]
    fn test_roundtrip_for_unregistered_two_char_mnemonics() {
        let (mnemonic, args) = decode(&encode("XY", &["a", "b", "c"]));
        assert_eq!(mnemonic, "XY");
        assert_eq!(args, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_registered_mnemonic_resolves_to_its_code() {
        assert!(register("move_entity", "MV"));
        assert_eq!(encode("move_entity", &["1"]), b"MV|1;".to_vec());
    }

    #[test]
    fn test_registration_rejects_codes_that_are_not_two_characters() {
        assert!(!register("too_long", "ABC"));
        assert!(!register("too_short", "A"));
    }

    #[test]
    fn test_decode_discards_empty_trailing_segments() {
        let (_, args) = decode(b"XY|a;b;");
        assert_eq!(args, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_decode_keeps_interior_empty_segments() {
        let (_, args) = decode(b"XY|a;;b;");
        assert_eq!(args, vec!["a".to_string(), "".to_string(), "b".to_string()]);
    }
}
