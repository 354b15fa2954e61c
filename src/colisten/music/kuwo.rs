use serde_json::Value;

use super::MusicApi;
use crate::colisten::value::Js;

const SEARCH_API: &str = "https://search.kuwo.cn/r.s";
const CONVERT_API: &str = "https://mobi.kuwo.cn/mobi.s";

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36 Edg/110.0.1587.50";

/// Resolves a kuwo stream url by keyword. Returns `(url, duration_ms)`.
pub(super) async fn playback_url(api: &MusicApi, keyword: &str) -> Result<(String, i64), String> {
    let search = api
        .client
        .get(SEARCH_API)
        .query(&[
            ("pn", "0"),
            ("rn", "10"),
            ("all", keyword),
            ("ft", "music"),
            ("newsearch", "1"),
            ("alflac", "1"),
            ("itemset", "web_2013"),
            ("client", "kt"),
            ("cluster", "0"),
            ("vermerge", "1"),
            ("rformat", "json"),
            ("encoding", "utf8"),
            ("show_copyright_off", "1"),
            ("pcmp4", "1"),
            ("ver", "mbox"),
            ("plat", "pc"),
            ("vipver", "1"),
            ("devid", "11404450"),
            ("newver", "1"),
            ("issubtitle", "1"),
            ("pcjson", "1"),
        ])
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|err| format!("kuwo search: {err}"))?
        .json::<Value>()
        .await
        .map_err(|err| format!("kuwo search body: {err}"))?;

    let rid = Js::new(&search)
        .get("abslist.0.MUSICRID")
        .string()
        .trim_start_matches("MUSIC_")
        .to_owned();
    if rid.is_empty() {
        return Err(format!("kuwo: no result for {keyword:?}"));
    }

    let converted = api
        .client
        .get(CONVERT_API)
        .query(&[
            ("f", "web"),
            ("source", "kwplayer_ar_4.4.2.7_B_nuoweida_vh.apk"),
            ("format", "mp3"),
            ("br", "2000kflac"),
            ("type", "convert_url_with_sign"),
            ("rid", rid.as_str()),
        ])
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|err| format!("kuwo convert: {err}"))?
        .json::<Value>()
        .await
        .map_err(|err| format!("kuwo convert body: {err}"))?;

    let data = Js::new(&converted).get("data");
    Ok((data.get("url").string(), data.get("duration").int() * 1000))
}
