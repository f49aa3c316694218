//! String helpers shared by the builtin directives.

use indexmap::IndexMap;

/// `"-my-item-"` becomes `"myItem"`.
pub fn kebab_to_camel_case(input: &str) -> String {
    let lower = input.trim_matches('-').to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut chars = lower.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('-', Some(next)) if next.is_ascii_lowercase() => {
                out.push(next.to_ascii_uppercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// Parse an inline style declaration list into property/value pairs.
pub fn css_string_to_map(css: &str) -> IndexMap<String, String> {
    css.split(';')
        .filter_map(|rule| {
            let (property, value) = rule.split_once(':')?;
            let property = property.trim();
            (!property.is_empty()).then(|| (property.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Inverse of [`css_string_to_map`].
pub fn map_to_css_string(map: &IndexMap<String, String>) -> String {
    map.iter()
        .map(|(property, value)| format!("{property}: {value};"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("item", "item")]
    #[case("my-item", "myItem")]
    #[case("-my-item-", "myItem")]
    #[case("My-Long-Item", "myLongItem")]
    #[case("a--b", "a-B")]
    #[case("item-2", "item-2")]
    fn camel_cases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(kebab_to_camel_case(input), expected);
    }

    #[test]
    fn style_maps() {
        let map = css_string_to_map("color: red; background:url(a:b) ;;  : x; width:1px");
        assert_eq!(map.get("color").map(String::as_str), Some("red"));
        assert_eq!(map.get("background").map(String::as_str), Some("url(a:b)"));
        assert_eq!(map.get("width").map(String::as_str), Some("1px"));
        assert_eq!(map.len(), 3);
        assert_eq!(map_to_css_string(&map), "color: red; background: url(a:b); width: 1px;");
    }
}
