use std::fmt::Display;

use super::tree::QueryDescriptor;

/// Substitutes `{{key}}` placeholders in a URL template.
///
/// Each parameter replaces only the first occurrence of its placeholder, since
/// endpoint templates declare every placeholder once. Parameters without a
/// placeholder are ignored and placeholders without a parameter stay verbatim.
///
/// ```rust
/// use rest_queries::endpoints::parse_url;
///
/// assert_eq!(parse_url("posts/{{id}}", [("id", 1)]), "posts/1");
/// assert_eq!(parse_url("posts?userId={{userId}}", [("userId", 7)]), "posts?userId=7");
/// assert_eq!(parse_url("posts/{{id}}", Vec::<(&str, u32)>::new()), "posts/{{id}}");
/// ```
pub fn parse_url<K, V>(template: &str, params: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: Display,
{
    params
        .into_iter()
        .fold(template.to_owned(), |url, (key, value)| {
            let placeholder = format!("{{{{{}}}}}", key.as_ref());
            url.replacen(&placeholder, &value.to_string(), 1)
        })
}

/// Applies [`parse_url`] to a descriptor's `url`, keeping everything else.
pub fn parse_config_url<K, V>(
    descriptor: &QueryDescriptor,
    params: impl IntoIterator<Item = (K, V)>,
) -> QueryDescriptor
where
    K: AsRef<str>,
    V: Display,
{
    QueryDescriptor {
        url: parse_url(&descriptor.url, params),
        ..descriptor.clone()
    }
}

/// An ordered list of template parameters with mixed value types.
///
/// ```rust
/// use rest_queries::endpoints::{UrlParams, parse_url};
///
/// let params = UrlParams::new().with("userId", 7).with("slug", "intro");
/// assert_eq!(parse_url("users/{{userId}}/{{slug}}", params), "users/7/intro");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParams(Vec<(String, String)>);

impl UrlParams {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.0.push((key.into(), value.to_string()));
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for UrlParams {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
