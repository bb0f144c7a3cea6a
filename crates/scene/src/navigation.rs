use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use url::Url;

/// Query parameter carrying the selected point's title.
pub const REFERENCE_PARAM: &str = "location";

/// Characters `encodeURIComponent` leaves untouched.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Address-bar style holder of the navigation reference.
///
/// Titles cross this boundary decoded; encoding is the implementation's
/// concern. `replace` is an in-place update, never a reload.
pub trait NavigationPort: Send {
    fn current(&self) -> Option<String>;
    fn replace(&mut self, title: Option<&str>);
}

pub fn encode_reference(title: &str) -> String {
    utf8_percent_encode(title, COMPONENT).to_string()
}

/// Decodes a raw parameter value. Empty values count as absent.
pub fn decode_reference(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    let decoded = percent_decode_str(&spaced).decode_utf8_lossy().into_owned();
    (!decoded.is_empty()).then_some(decoded)
}

/// Plain in-memory reference, used when there is no address to rewrite.
#[derive(Debug, Default, Clone)]
pub struct MemoryNavigation {
    title: Option<String>,
    replacements: u64,
}

impl MemoryNavigation {
    pub fn new(title: Option<String>) -> Self {
        Self {
            title,
            replacements: 0,
        }
    }

    pub fn replacements(&self) -> u64 {
        self.replacements
    }
}

impl NavigationPort for MemoryNavigation {
    fn current(&self) -> Option<String> {
        self.title.clone()
    }

    fn replace(&mut self, title: Option<&str>) {
        self.title = title.map(str::to_owned);
        self.replacements += 1;
    }
}

/// Navigation reference stored in a URL's query string.
///
/// Only the `location` parameter is rewritten; other parameters keep their
/// original order and encoding.
#[derive(Debug, Clone)]
pub struct UrlNavigation {
    url: Url,
}

impl UrlNavigation {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn parse(link: &str) -> Result<Self, url::ParseError> {
        Url::parse(link).map(Self::new)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn href(&self) -> &str {
        self.url.as_str()
    }

    fn other_params(&self) -> Vec<&str> {
        self.url
            .query()
            .unwrap_or("")
            .split('&')
            .filter(|pair| !pair.is_empty() && param_name(pair) != REFERENCE_PARAM)
            .collect()
    }
}

fn param_name(pair: &str) -> &str {
    pair.split_once('=').map_or(pair, |(name, _)| name)
}

impl NavigationPort for UrlNavigation {
    fn current(&self) -> Option<String> {
        self.url
            .query()?
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(name, _)| *name == REFERENCE_PARAM)
            .and_then(|(_, value)| decode_reference(value))
    }

    fn replace(&mut self, title: Option<&str>) {
        let mut params: Vec<String> = self.other_params().into_iter().map(str::to_owned).collect();
        if let Some(title) = title {
            params.push(format!("{REFERENCE_PARAM}={}", encode_reference(title)));
        }
        if params.is_empty() {
            self.url.set_query(None);
        } else {
            self.url.set_query(Some(&params.join("&")));
        }
    }
}
