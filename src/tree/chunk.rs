// ABOUTME: Groups row tuples into size-bounded extended INSERT payloads
// ABOUTME: Oversized single rows are emitted alone rather than split or dropped

/// Lazy iterator produced by [`chunkify`]
pub struct Chunks<I> {
    items: I,
    separator: String,
    max_len: usize,
    chunk: String,
    // An empty item still occupies a slot, so `chunk.is_empty()` is not enough
    has_items: bool,
    oversized: Option<String>,
}

/// Joins items with `separator` into chunks of at most `max_len` bytes
///
/// An item is appended while `chunk + separator + item` fits; otherwise the
/// current chunk is flushed and the item starts the next one. An item that is
/// longer than `max_len` by itself becomes its own oversized chunk.
///
/// # Examples
///
/// ```
/// # use mysql_dumpfs::tree::chunkify;
/// let rows = vec!["(1,2)", "(3,4)", "(5,6)"];
/// let chunks: Vec<String> = chunkify(rows, ",", 11).collect();
/// assert_eq!(chunks, vec!["(1,2),(3,4)", "(5,6)"]);
/// ```
pub fn chunkify<I, S>(items: I, separator: &str, max_len: usize) -> Chunks<I::IntoIter>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Chunks {
        items: items.into_iter(),
        separator: separator.to_string(),
        max_len,
        chunk: String::new(),
        has_items: false,
        oversized: None,
    }
}

impl<I, S> Iterator for Chunks<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if let Some(item) = self.oversized.take() {
            return Some(item);
        }

        for item in self.items.by_ref() {
            let item = item.as_ref();

            if self.chunk.len() + self.separator.len() + item.len() > self.max_len {
                let flushed = take_chunk(&mut self.chunk, &mut self.has_items);

                if item.len() > self.max_len {
                    match flushed {
                        Some(flushed) => {
                            self.oversized = Some(item.to_string());
                            return Some(flushed);
                        }
                        None => return Some(item.to_string()),
                    }
                }

                self.chunk.push_str(item);
                self.has_items = true;
                if flushed.is_some() {
                    return flushed;
                }
                continue;
            }

            if self.has_items {
                self.chunk.push_str(&self.separator);
            }
            self.chunk.push_str(item);
            self.has_items = true;
        }

        take_chunk(&mut self.chunk, &mut self.has_items)
    }
}

fn take_chunk(chunk: &mut String, has_items: &mut bool) -> Option<String> {
    if !std::mem::take(has_items) {
        return None;
    }
    Some(std::mem::take(chunk))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(items: &[&str], separator: &str, max_len: usize) -> Vec<String> {
        chunkify(items.iter(), separator, max_len).collect()
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        assert!(chunks(&[], ",", 10).is_empty());
    }

    #[test]
    fn test_everything_fits_in_one_chunk() {
        let result = chunks(&["(1,2)", "(3,4)", "(5,6)"], ",", 20);
        assert_eq!(result, vec!["(1,2),(3,4),(5,6)"]);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        // 5 + 1 + 5 == 11 fits, the third row would make 17
        let result = chunks(&["(1,2)", "(3,4)", "(5,6)"], ",", 11);
        assert_eq!(result, vec!["(1,2),(3,4)", "(5,6)"]);

        let result = chunks(&["(1,2)", "(3,4)", "(5,6)"], ",", 10);
        assert_eq!(result, vec!["(1,2)", "(3,4)", "(5,6)"]);
    }

    #[test]
    fn test_separator_counts_against_first_item() {
        // len("") + len(",") + len("abcde") == 6 > 5, yet the item alone fits
        let result = chunks(&["abcde", "f"], ",", 5);
        assert_eq!(result, vec!["abcde", "f"]);
    }

    #[test]
    fn test_oversized_item_is_emitted_alone() {
        let result = chunks(&["(1)", "(0123456789)", "(2)", "(3)"], ",", 8);
        assert_eq!(result, vec!["(1)", "(0123456789)", "(2),(3)"]);
    }

    #[test]
    fn test_leading_oversized_item() {
        let result = chunks(&["(0123456789)", "(1)"], ",", 8);
        assert_eq!(result, vec!["(0123456789)", "(1)"]);
    }

    #[test]
    fn test_consecutive_oversized_items() {
        let result = chunks(&["(1)", "(aaaaaaaaaa)", "(bbbbbbbbbb)"], ",", 8);
        assert_eq!(result, vec!["(1)", "(aaaaaaaaaa)", "(bbbbbbbbbb)"]);
    }

    #[test]
    fn test_multi_char_separator() {
        let result = chunks(&["(1)", "(2)", "(3)"], ",\n", 8);
        assert_eq!(result, vec!["(1),\n(2)", "(3)"]);
    }

    #[test]
    fn test_empty_items_are_kept() {
        let result = chunks(&["", "a", "", "b"], ",", 100);
        assert_eq!(result, vec![",a,,b"]);

        let result = chunks(&["", ""], ",", 0);
        assert_eq!(result, vec!["", ""]);
    }

    #[test]
    fn test_rejoining_chunks_restores_rows() {
        let rows: Vec<String> = (0..500)
            .map(|i| format!("({},'{}')", i, "x".repeat(i % 37)))
            .collect();
        let max_len = 120;

        let result: Vec<String> = chunkify(&rows, ",", max_len).collect();

        assert!(result.len() > 1);
        for chunk in &result {
            assert!(chunk.len() <= max_len, "chunk too long: {}", chunk.len());
        }
        assert_eq!(result.join(","), rows.join(","));
    }
}
