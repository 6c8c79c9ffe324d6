//! Asset link rewriting in rendered output.

use crate::AssetMapping;

const TOKEN: &str = "/assets/";

/// Characters that end an asset reference.
const DELIMITERS: &[char] = &[
    ' ', '\t', '\n', '"', '\'', '(', ')', '<', '>', '[', ']', '{', '}',
];

/// Replace `/assets/<path>` references in `input` with `/a/<name>`.
///
/// A reference is the token up to the next whitespace, quote, bracket, or
/// parenthesis. References missing from `mapping` are kept as written.
/// Doubling the leading slash escapes a reference: `//assets/x.png` is
/// emitted as `/assets/x.png` and not rewritten.
pub fn rewrite_asset_links(input: &str, mapping: &AssetMapping) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(offset) = rest.find(TOKEN) {
        let (before, from_token) = rest.split_at(offset);
        let end = from_token[TOKEN.len()..]
            .find(DELIMITERS)
            .map_or(from_token.len(), |pos| pos + TOKEN.len());
        let reference = &from_token[..end];

        out.push_str(before);
        if before.ends_with('/') {
            out.push_str(&reference[1..]);
        } else if let Some(name) = mapping.name_for(reference) {
            out.push_str("/a/");
            out.push_str(name);
        } else {
            out.push_str(reference);
        }

        rest = &from_token[end..];
    }

    out.push_str(rest);
    out
}
