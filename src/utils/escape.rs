/// escape text for embedding as XML character data or attribute value
pub trait XmlEscape {
    fn xml_escape(&self) -> String;
}

impl XmlEscape for str {
    fn xml_escape(&self) -> String {
        let mut result = String::with_capacity(self.len() + self.len() / 8);
        for c in self.chars() {
            match c {
                '<' => result.push_str("&lt;"),
                '>' => result.push_str("&gt;"),
                '&' => result.push_str("&amp;"),
                '"' => result.push_str("&quot;"),
                '\'' => result.push_str("&apos;"),
                _ => result.push(c),
            }
        }
        result
    }
}

/// return the text between the first `open` tag and the first `close` tag after it.
/// `None` when either tag is missing; empty content is a valid result.
#[must_use]
pub fn xml_extract<'a>(xml: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = xml.find(open)? + open.len();
    let len = xml[start..].find(close)?;
    Some(&xml[start..start + len])
}

/// like `xml_extract`, but only looks at the document from `cursor` on
#[must_use]
pub fn xml_extract_after<'a>(xml: &'a str, cursor: &str, open: &str, close: &str) -> Option<&'a str> {
    let pos = xml.find(cursor)?;
    xml_extract(&xml[pos..], open, close)
}

/// truncate to at most `max` characters, never splitting a character
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!("<>&\"'".xml_escape(), "&lt;&gt;&amp;&quot;&apos;");
        assert_eq!("".xml_escape(), "");
        assert_eq!("Tom & Jerry.mkv".xml_escape(), "Tom &amp; Jerry.mkv");
        // double escaping, as used for DIDL-Lite inside a SOAP body
        assert_eq!("<a>".xml_escape().xml_escape(), "&amp;lt;a&amp;gt;");
        assert_eq!("héllo wörld".xml_escape(), "héllo wörld");
    }

    #[test]
    fn test_extract() {
        let xml = "<a>first</a><a>second</a>";
        assert_eq!(xml_extract(xml, "<a>", "</a>"), Some("first"));
        assert_eq!(xml_extract("<a></a>", "<a>", "</a>"), Some(""));
        assert_eq!(xml_extract("<a>unterminated", "<a>", "</a>"), None);
        assert_eq!(xml_extract("<b>x</b>", "<a>", "</a>"), None);
        // the close tag must follow the open tag
        assert_eq!(xml_extract("</a><a>x", "<a>", "</a>"), None);
    }

    #[test]
    fn test_extract_after() {
        let xml = "<service><serviceType>RenderingControl</serviceType>\
                   <controlURL>/rc</controlURL></service>\
                   <service><serviceType>AVTransport</serviceType>\
                   <controlURL>/av</controlURL></service>";
        assert_eq!(
            xml_extract_after(xml, "AVTransport", "<controlURL>", "</controlURL>"),
            Some("/av")
        );
        assert_eq!(
            xml_extract_after(xml, "ConnectionManager", "<controlURL>", "</controlURL>"),
            None
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("", 5), "");
    }
}
