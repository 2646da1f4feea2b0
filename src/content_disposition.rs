use http::header::{self, HeaderMap};

pub(crate) struct ContentDisposition {
    pub(crate) field_name: Option<String>,
    pub(crate) file_name: Option<String>,
}

impl ContentDisposition {
    pub fn parse(headers: &HeaderMap) -> ContentDisposition {
        let content_disposition = headers
            .get(header::CONTENT_DISPOSITION)
            .map(|val| String::from_utf8_lossy(val.as_bytes()).into_owned());

        let mut field_name = None;
        let mut file_name = None;

        if let Some(val) = content_disposition {
            for (key, value) in parameters(&val) {
                match key.as_str() {
                    "name" if field_name.is_none() => field_name = Some(value),
                    "filename" if file_name.is_none() => file_name = Some(value),
                    _ => {}
                }
            }
        }

        ContentDisposition { field_name, file_name }
    }
}

/// Splits a `Content-Disposition` value into its `key=value` parameters.
///
/// Quoted values may contain `;` and backslash-escaped quotes; bare tokens
/// such as the leading `form-data` carry no `=` and are skipped.
fn parameters(value: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = value.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_ascii_whitespace() || *c == ';') {
            chars.next();
        }

        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ';' {
                break;
            }
            key.push(c);
            chars.next();
        }

        if chars.peek() != Some(&'=') {
            continue;
        }
        chars.next();

        let mut val = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            val.push(escaped);
                        }
                    }
                    '"' => break,
                    c => val.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ';' {
                    break;
                }
                val.push(c);
                chars.next();
            }
            val.truncate(val.trim_end().len());
        }

        params.push((key.trim().to_ascii_lowercase(), val));
    }

    params
}

#[cfg(test)]
mod tests {
    use http::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION};

    use super::ContentDisposition;

    fn parse(value: &str) -> ContentDisposition {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_DISPOSITION, HeaderValue::from_bytes(value.as_bytes()).unwrap());
        ContentDisposition::parse(&headers)
    }

    #[test]
    fn test_content_disposition_field_name() {
        let cd = parse(r#"form-data; name="my_field""#);
        assert_eq!(cd.field_name.as_deref(), Some("my_field"));
        assert_eq!(cd.file_name, None);

        let cd = parse(r#"form-data; name="my field""#);
        assert_eq!(cd.field_name.as_deref(), Some("my field"));

        let cd = parse(r#"form-data; name="my_field"; filename="file abc.txt""#);
        assert_eq!(cd.field_name.as_deref(), Some("my_field"));
        assert_eq!(cd.file_name.as_deref(), Some("file abc.txt"));

        let cd = parse("form-data; name=\"你好\"; filename=\"file abc.txt\"");
        assert_eq!(cd.field_name.as_deref(), Some("你好"));

        let cd = parse("form-data; name=\"কখগ\"; filename=\"你好.txt\"");
        assert_eq!(cd.field_name.as_deref(), Some("কখগ"));
        assert_eq!(cd.file_name.as_deref(), Some("你好.txt"));
    }

    #[test]
    fn test_content_disposition_file_name() {
        let cd = parse(r#"form-data; name="my_field"; filename="file_name.txt""#);
        assert_eq!(cd.file_name.as_deref(), Some("file_name.txt"));

        let cd = parse(r#"form-data; filename="file-name.txt""#);
        assert_eq!(cd.field_name, None);
        assert_eq!(cd.file_name.as_deref(), Some("file-name.txt"));
    }

    #[test]
    fn test_quoted_semicolons_and_escapes() {
        let cd = parse(r#"form-data; name="a;b"; filename="say \"hi\".txt""#);
        assert_eq!(cd.field_name.as_deref(), Some("a;b"));
        assert_eq!(cd.file_name.as_deref(), Some(r#"say "hi".txt"#));
    }

    #[test]
    fn test_unquoted_token_value() {
        let cd = parse("form-data; name=plain");
        assert_eq!(cd.field_name.as_deref(), Some("plain"));
    }

    #[test]
    fn test_missing_header() {
        let headers = HeaderMap::new();
        let cd = ContentDisposition::parse(&headers);
        assert_eq!(cd.field_name, None);
        assert_eq!(cd.file_name, None);
    }
}
