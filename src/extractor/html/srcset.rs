//! `srcset` candidate parsing

/// URLs of a `srcset` value (`a.png 1x, b.png 2x`). Descriptors are
/// discarded; commas inside a URL are kept unless they end it.
pub fn parse_srcset(value: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut rest = value;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }

        let end = rest.find(|c: char| c.is_ascii_whitespace()).unwrap_or(rest.len());
        let candidate = &rest[..end];
        rest = &rest[end..];

        let url = candidate.trim_end_matches(',');
        if !url.is_empty() {
            urls.push(url.to_string());
        }

        // A trailing comma ends the candidate; otherwise skip the descriptor
        if !candidate.ends_with(',') {
            match rest.find(',') {
                Some(comma) => rest = &rest[comma + 1..],
                None => break,
            }
        }
    }

    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_with_descriptors() {
        assert_eq!(
            parse_srcset("small.jpg 480w, large.jpg 1080w"),
            vec!["small.jpg".to_string(), "large.jpg".to_string()]
        );
    }

    #[test]
    fn candidates_without_descriptors_and_commas_in_urls() {
        assert_eq!(
            parse_srcset("a.png,b.png 2x, https://cdn.example.com/img,w_100/c.png 3x"),
            vec![
                "a.png,b.png".to_string(),
                "https://cdn.example.com/img,w_100/c.png".to_string()
            ]
        );
        assert_eq!(parse_srcset("one.png, two.png"), vec!["one.png".to_string(), "two.png".to_string()]);
    }

    #[test]
    fn empty_and_whitespace() {
        assert!(parse_srcset("").is_empty());
        assert!(parse_srcset("  ,  ").is_empty());
    }
}
