//! `{{< raw >}}` blocks.
//!
//! Raw blocks are cut out of the source before any processing and spliced
//! back verbatim at the end. Blocks nest; only the outermost pair is
//! replaced.

const OPEN: &str = "{{< raw >}}";
const CLOSE: &str = "{{< /raw >}}";

/// Bodies of the raw blocks removed from a source, by placeholder index.
#[derive(Debug, Default)]
pub(crate) struct RawBlocks {
    bodies: Vec<String>,
}

fn placeholder(index: usize) -> String {
    format!("@@RAW{index}@@")
}

impl RawBlocks {
    /// Replace each outermost raw block in `src` with a placeholder.
    ///
    /// Returns `None` if an opening tag has no matching close.
    pub(crate) fn extract(src: &str) -> Option<(String, Self)> {
        let mut out = String::with_capacity(src.len());
        let mut blocks = Self::default();
        let mut rest = src;

        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            rest = &rest[start + OPEN.len()..];

            let mut depth = 1;
            let mut scan = 0;
            loop {
                let close = scan + rest[scan..].find(CLOSE)?;
                match rest[scan..].find(OPEN).map(|i| scan + i) {
                    Some(open) if open < close => {
                        depth += 1;
                        scan = open + OPEN.len();
                    }
                    _ => {
                        depth -= 1;
                        scan = close + CLOSE.len();
                        if depth == 0 {
                            out.push_str(&placeholder(blocks.bodies.len()));
                            blocks.bodies.push(rest[..close].to_owned());
                            rest = &rest[scan..];
                            break;
                        }
                    }
                }
            }
        }
        out.push_str(rest);
        Some((out, blocks))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Put the block bodies back in place of their placeholders.
    pub(crate) fn restore(&self, rendered: &str) -> String {
        let mut out = rendered.to_owned();
        for (i, body) in self.bodies.iter().enumerate() {
            out = out.replace(&placeholder(i), body);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_without_blocks() {
        let (out, blocks) = RawBlocks::extract("plain {{ text }}").unwrap();
        assert_eq!(out, "plain {{ text }}");
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_extract_and_restore() {
        let src = "a {{< raw >}}{{ keep }}{{< /raw >}} b {{< raw >}}<x>{{< /raw >}}";
        let (out, blocks) = RawBlocks::extract(src).unwrap();
        assert_eq!(out, "a @@RAW0@@ b @@RAW1@@");
        assert_eq!(blocks.restore(&out), "a {{ keep }} b <x>");
    }

    #[test]
    fn test_nested_blocks_keep_inner_tags() {
        let src = "{{< raw >}}x {{< raw >}}y{{< /raw >}} z{{< /raw >}}!";
        let (out, blocks) = RawBlocks::extract(src).unwrap();
        assert_eq!(out, "@@RAW0@@!");
        assert_eq!(blocks.restore(&out), "x {{< raw >}}y{{< /raw >}} z!");
    }

    #[test]
    fn test_unmatched_open() {
        assert!(RawBlocks::extract("{{< raw >}} never closed").is_none());
        assert!(RawBlocks::extract("{{< raw >}}{{< raw >}}{{< /raw >}}").is_none());
    }

    #[test]
    fn test_stray_close_is_text() {
        let (out, blocks) = RawBlocks::extract("x {{< /raw >}}").unwrap();
        assert_eq!(out, "x {{< /raw >}}");
        assert!(blocks.is_empty());
    }
}
