pub trait SanitizeArg {
    fn sanitize_bool(self) -> String;
}

impl SanitizeArg for &str {
    fn sanitize_bool(self) -> String {
        match self {
            "T" | "t" | "True" | "Y" | "Yes" | "y" | "yes" | "1" | "on" => "true".to_string(),
            "F" | "f" | "False" | "N" | "No" | "n" | "no" | "0" | "off" => "false".to_string(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_sanitize_bool() {
        use crate::utils::traits::*;
        for arg in ["T", "t", "True", "Y", "Yes", "y", "yes", "1", "on"] {
            assert_eq!(arg.sanitize_bool(), "true");
        }
        for arg in ["F", "f", "False", "N", "No", "n", "no", "0", "off"] {
            assert_eq!(arg.sanitize_bool(), "false");
        }
        assert_eq!("true".sanitize_bool(), "true");
        assert_eq!("garbage".sanitize_bool(), "garbage");
    }
}
