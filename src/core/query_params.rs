use std::collections::HashMap;

/// Parse the query string of a URI into key-value pairs. Values are
/// URL-decoded; a repeated key keeps the last value; a bare flag maps
/// to an empty string.
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    if let Some(query_start) = uri.find('?') {
        let query = &uri[query_start + 1..];
        for param in query.split('&') {
            if let Some(eq_idx) = param.find('=') {
                let key = &param[..eq_idx];
                let encoded_value = &param[eq_idx + 1..];
                let decoded = urlencoding::decode(encoded_value)
                    .unwrap_or(std::borrow::Cow::Borrowed(encoded_value))
                    .to_string();
                params.insert(key.to_string(), decoded);
            } else {
                params.insert(param.to_string(), String::new());
            }
        }
    }

    params
}

pub fn get_string(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params.get(key).cloned()
}

pub fn get_bool_flag(params: &HashMap<String, String>, key: &str) -> bool {
    params.get(key).map(|v| v == "true").unwrap_or(false)
}

/// 1-based page number; anything unparsable or below 1 becomes 1.
pub fn get_page(params: &HashMap<String, String>) -> usize {
    params
        .get("page")
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1)
        .max(1)
}
