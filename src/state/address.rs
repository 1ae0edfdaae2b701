/// The page URL's query string, as far as map selection is concerned.
pub trait AddressBar {
    /// Current query string, with or without the leading `?`.
    fn search(&self) -> String;
    /// Replace the query string without adding a history entry.
    fn replace_search(&mut self, search: &str);
}

pub(crate) const ID_PARAM: &str = "id";

/// Value of the `id` query parameter, if it is a map id.
pub fn id_param(search: &str) -> Option<u32> {
    search
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let k = urlencoding::decode(k).ok()?;
            (k == ID_PARAM).then(|| urlencoding::decode(v).ok())?
        })
        .find_map(|v| v.trim().parse().ok())
}

/// `search` with its `id` parameter set to `map_id`; other parameters are kept.
pub fn with_id_param(search: &str, map_id: u32) -> String {
    let mut pairs: Vec<String> = search
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let k = pair.split_once('=').map_or(*pair, |(k, _)| k);
            urlencoding::decode(k).map_or(true, |k| k != ID_PARAM)
        })
        .map(str::to_string)
        .collect();
    pairs.insert(
        0,
        format!(
            "{ID_PARAM}={}",
            urlencoding::encode(&map_id.to_string())
        ),
    );
    format!("?{}", pairs.join("&"))
}

/// Address bar kept in memory, for tests and non-browser hosts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryAddressBar {
    search: String,
}

impl MemoryAddressBar {
    pub fn new(search: impl Into<String>) -> Self {
        Self {
            search: search.into(),
        }
    }
}

impl AddressBar for MemoryAddressBar {
    fn search(&self) -> String {
        self.search.clone()
    }

    fn replace_search(&mut self, search: &str) {
        self.search = search.to_string();
    }
}
