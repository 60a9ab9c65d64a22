use crate::RelayResult;
use url::Url;

/// Append the bearer token to the realtime endpoint as `?token=...`.
pub fn realtime_url(base: &str, token: &str) -> RelayResult<Url> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}
