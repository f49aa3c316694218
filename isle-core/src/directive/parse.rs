//! Directive attribute names.
//!
//! A directive attribute is `<prefix><name>[--<suffix>][---<unique-id>]`,
//! for example `data-wp-on--click---analytics`.

/// The parts of a directive attribute name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDirectiveName {
    /// The directive name, e.g. `on`.
    pub prefix: String,
    pub suffix: Option<String>,
    pub unique_id: Option<String>,
}

/// Split `attribute` (which must start with `directive_prefix`) into its
/// directive name, suffix and unique id.
///
/// Returns `None` when the attribute does not carry the prefix or the rest
/// contains characters outside `[a-zA-Z0-9_-]`.
pub fn parse_directive_name(attribute: &str, directive_prefix: &str) -> Option<ParsedDirectiveName> {
    let name = attribute.strip_prefix(directive_prefix)?;
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return None;
    }

    let Some(suffix_index) = name.find("--") else {
        return Some(ParsedDirectiveName {
            prefix: name.to_string(),
            suffix: None,
            unique_id: None,
        });
    };

    let prefix = name[..suffix_index].to_string();
    let remaining = &name[suffix_index..];

    // `---x` right after the name: no suffix, only a unique id.
    if remaining.starts_with("---") && remaining.as_bytes().get(3) != Some(&b'-') {
        return Some(ParsedDirectiveName {
            prefix,
            suffix: None,
            unique_id: non_empty(&remaining[3..]),
        });
    }

    let suffix = &remaining[2..];
    if let Some(unique_index) = suffix.find("---") {
        if suffix.as_bytes().get(unique_index + 3) != Some(&b'-') {
            return Some(ParsedDirectiveName {
                prefix,
                suffix: non_empty(&suffix[..unique_index]),
                unique_id: non_empty(&suffix[unique_index + 3..]),
            });
        }
    }

    Some(ParsedDirectiveName {
        prefix,
        suffix: non_empty(suffix),
        unique_id: None,
    })
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const PREFIX: &str = "data-wp-";

    fn parse(name: &str) -> Option<(String, Option<String>, Option<String>)> {
        parse_directive_name(&format!("{PREFIX}{name}"), PREFIX)
            .map(|parsed| (parsed.prefix, parsed.suffix, parsed.unique_id))
    }

    fn s(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[rstest]
    #[case("test", None, None)]
    #[case("test--suffix", s("suffix"), None)]
    #[case("test---unique-id", None, s("unique-id"))]
    #[case("test--suffix---unique-id", s("suffix"), s("unique-id"))]
    #[case("test--", None, None)]
    #[case("test---", None, None)]
    #[case("test----", s("--"), None)]
    #[case("test------custom-suffix", s("----custom-suffix"), None)]
    #[case("test--complex--suffix---complex--unique---id", s("complex--suffix"), s("complex--unique---id"))]
    #[case("test----suffix---unique-id", s("--suffix"), s("unique-id"))]
    #[case("test---unique-id--wrong-suffix", None, s("unique-id--wrong-suffix"))]
    #[case("test--suffix----unique-id", s("suffix----unique-id"), None)]
    #[case("on--click", s("click"), None)]
    #[case("my_directive--with_underscore", s("with_underscore"), None)]
    fn parses_names(
        #[case] name: &str,
        #[case] suffix: Option<String>,
        #[case] unique_id: Option<String>,
    ) {
        let (prefix, parsed_suffix, parsed_id) = parse(name).unwrap();
        assert_eq!(prefix, name.split("--").next().unwrap());
        assert_eq!(parsed_suffix, suffix, "suffix of {name}");
        assert_eq!(parsed_id, unique_id, "unique id of {name}");
    }

    #[rstest]
    #[case("test--suffix.with.dots")]
    #[case("test::ns")]
    #[case("test suffix")]
    #[case("tést")]
    fn rejects_invalid_characters(#[case] name: &str) {
        assert_eq!(parse(name), None);
    }

    #[test]
    fn requires_the_prefix() {
        assert_eq!(parse_directive_name("data-other-text", PREFIX), None);
        assert_eq!(
            parse_directive_name("data-ns-text", "data-ns-").map(|p| p.prefix),
            Some("text".to_string())
        );
    }

    proptest! {
        #[test]
        fn parsing_is_pure(name in "[a-z0-9_-]{0,24}") {
            prop_assert_eq!(parse(&name), parse(&name));
            let (prefix, suffix, unique_id) = parse(&name).unwrap();
            prop_assert!(!prefix.contains("--"));
            prop_assert!(suffix.as_deref() != Some(""));
            prop_assert!(unique_id.as_deref() != Some(""));
        }

        #[test]
        fn invalid_names_never_parse(name in "[a-z]{1,6}[.:/ ][a-z]{0,6}") {
            prop_assert_eq!(parse(&name), None);
        }
    }
}
