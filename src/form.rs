//! Form body decoding: `application/x-www-form-urlencoded` and the text
//! fields of `multipart/form-data`.

use std::collections::HashMap;

use tracing::debug;

/// Decodes `a=1&b=2` pairs. The first occurrence of a name wins.
pub(crate) fn urlencoded(input: &[u8]) -> HashMap<String, String> {
    match serde_urlencoded::from_bytes::<Vec<(String, String)>>(input) {
        Ok(pairs) => first_wins(pairs),
        Err(e) => {
            debug!(error = %e, "ignoring malformed url-encoded data");
            HashMap::new()
        }
    }
}

/// Returns the boundary parameter of a `multipart/form-data` content type.
pub(crate) fn boundary(content_type: &str) -> Option<&str> {
    let mut parts = content_type.split(';');
    let mime = parts.next()?.trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    parts
        .filter_map(|p| p.trim().split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v.trim().trim_matches('"'))
        .filter(|b| !b.is_empty())
}

/// Collects the text fields of a multipart body. File parts (those with a
/// `filename`) are not form attributes and are skipped.
pub(crate) fn multipart_fields(body: &[u8], boundary: &str) -> HashMap<String, String> {
    let text = String::from_utf8_lossy(body);
    let delimiter = format!("--{boundary}");
    let mut fields = Vec::new();

    for part in text.split(delimiter.as_str()).skip(1) {
        if part.starts_with("--") {
            break;
        }
        let part = part.strip_prefix("\r\n").unwrap_or(part);
        let Some((head, value)) = part.split_once("\r\n\r\n") else {
            continue;
        };
        let value = value.strip_suffix("\r\n").unwrap_or(value);

        let mut name = None;
        let mut is_file = false;
        for line in head.lines() {
            let Some((key, rest)) = line.split_once(':') else { continue };
            if !key.trim().eq_ignore_ascii_case("content-disposition") {
                continue;
            }
            for param in rest.split(';').skip(1) {
                match param.trim().split_once('=') {
                    Some(("name", v))     => name = Some(v.trim_matches('"').to_owned()),
                    Some(("filename", _)) => is_file = true,
                    _ => {}
                }
            }
        }

        if let (Some(name), false) = (name, is_file) {
            fields.push((name, value.to_owned()));
        }
    }
    first_wins(fields)
}

fn first_wins(pairs: Vec<(String, String)>) -> HashMap<String, String> {
    let mut map = HashMap::with_capacity(pairs.len());
    for (k, v) in pairs {
        map.entry(k).or_insert(v);
    }
    map
}
