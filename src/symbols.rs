//! Function display names.

use std::collections::BTreeMap;

/// Declared function names keyed by global function index (imports first).
pub type FunctionNames = BTreeMap<u32, String>;

/// Display name for `function_index`.
///
/// Uses the declared name when there is one, otherwise a synthetic
/// `unnamedXXXX` built from the index in uppercase hex. The result is
/// never empty.
pub fn resolve(function_index: u32, names: &FunctionNames) -> String {
    match names.get(&function_index) {
        Some(name) if !name.is_empty() => name.clone(),
        _ => synthetic_name(function_index),
    }
}

/// Fallback name for functions stripped of debug names.
pub fn synthetic_name(function_index: u32) -> String {
    format!("unnamed{:04X}", function_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn table() -> FunctionNames {
        let mut names = FunctionNames::new();
        names.insert(0, "env.memcpy".to_string());
        names.insert(2, "add".to_string());
        names.insert(3, String::new());
        names
    }

    #[rstest]
    #[case(0, "env.memcpy")]
    #[case(2, "add")]
    #[case(7, "unnamed0007")]
    #[case(3, "unnamed0003")]
    #[case(0xab, "unnamed00AB")]
    #[case(0x12345, "unnamed12345")]
    fn test_resolve(#[case] index: u32, #[case] expected: &str) {
        assert_eq!(resolve(index, &table()), expected);
    }

    #[test]
    fn test_resolve_never_empty() {
        let names = table();
        for index in 0..64 {
            assert!(!resolve(index, &names).is_empty());
        }
    }
}
