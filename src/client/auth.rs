/// Credentials sent with every Google Cloud API request
#[derive(Clone)]
pub enum Auth {
    /// OAuth 2.0 access token sent as `Authorization: Bearer`
    Bearer(String),
    /// Don't send credentials (emulators, local proxies)
    None,
}

impl Auth {
    pub fn new(token: Option<String>) -> Self {
        match token {
            Some(token) if !token.trim().is_empty() => Self::Bearer(token.trim().to_string()),
            _ => Self::None,
        }
    }
}

impl std::fmt::Display for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => write!(f, "Bearer"),
            Self::None => write!(f, "None"),
        }
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Auth({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_token_is_none() {
        assert!(matches!(Auth::new(None), Auth::None));
        assert!(matches!(Auth::new(Some("  ".into())), Auth::None));
        assert!(matches!(Auth::new(Some("ya29.token".into())), Auth::Bearer(t) if t == "ya29.token"));
    }

    #[test]
    fn test_debug_hides_token() {
        let auth = Auth::new(Some("secret".into()));
        assert_eq!(format!("{:?}", auth), "Auth(Bearer)");
    }
}
