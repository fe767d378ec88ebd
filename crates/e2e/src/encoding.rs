//! Escaping helpers for selectors, WebDAV paths and injected scripts.

use crate::error::{E2eError, E2eResult};

/// Serializes `value` the way the CSSOM `CSS.escape()` does.
///
/// File names go into attribute selectors such as `tr[data-file="…"]`, so
/// quotes, backslashes and control characters must not terminate the string.
pub fn css_escape(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len());

    for (i, &c) in chars.iter().enumerate() {
        let code = c as u32;
        if c == '\0' {
            out.push('\u{FFFD}');
        } else if (0x01..=0x1F).contains(&code)
            || code == 0x7F
            || (i == 0 && c.is_ascii_digit())
            || (i == 1 && c.is_ascii_digit() && chars[0] == '-')
        {
            out.push_str(&format!("\\{:x} ", code));
        } else if i == 0 && c == '-' && chars.len() == 1 {
            out.push_str("\\-");
        } else if code >= 0x80 || c == '-' || c == '_' || c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }

    out
}

/// Builds the WebDAV destination for an upload.
///
/// `folder` is split on `/` and each segment percent-encoded; the result
/// always starts with `/` and ends with the encoded file name.
pub fn dav_path(folder: &str, file_name: &str) -> String {
    let mut path = folder
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    if !path.is_empty() && !path.starts_with('/') {
        path.insert(0, '/');
    }
    let path = path.trim_end_matches('/');
    format!("{}/{}", path, urlencoding::encode(file_name))
}

/// Quotes a string as a JavaScript literal for embedding in page scripts.
pub fn js_string(value: &str) -> E2eResult<String> {
    serde_json::to_string(value).map_err(|e| E2eError::Script(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("audio.mp3", "audio\\.mp3" ; "dot")]
    #[test_case("my file.txt", "my\\ file\\.txt" ; "space")]
    #[test_case("1st.png", "\\31 st\\.png" ; "leading digit")]
    #[test_case("-2.png", "-\\32 \\.png" ; "dash then digit")]
    #[test_case("-", "\\-" ; "lone dash")]
    #[test_case("a\"b", "a\\\"b" ; "double quote")]
    #[test_case("été", "été" ; "non ascii passthrough")]
    #[test_case("tab\there", "tab\\9 here" ; "control char")]
    fn escapes_like_cssom(input: &str, expected: &str) {
        assert_eq!(css_escape(input), expected);
    }

    #[test]
    fn nul_becomes_replacement_character() {
        assert_eq!(css_escape("a\0b"), "a\u{FFFD}b");
    }

    #[test_case("", "audio.mp3", "/audio.mp3" ; "root")]
    #[test_case("/Photos", "a b.jpg", "/Photos/a%20b.jpg" ; "folder with leading slash")]
    #[test_case("Photos/2020", "x.png", "/Photos/2020/x.png" ; "nested without slash")]
    #[test_case("/Dir #1/", "q?.txt", "/Dir%20%231/q%3F.txt" ; "reserved characters")]
    fn builds_dav_paths(folder: &str, name: &str, expected: &str) {
        assert_eq!(dav_path(folder, name), expected);
    }

    #[test]
    fn js_string_escapes_quotes() {
        let quoted = js_string(r#"'); alert("x");//"#).unwrap();
        assert!(quoted.starts_with('"') && quoted.ends_with('"'));
        assert!(quoted.contains("\\\""));
    }
}
