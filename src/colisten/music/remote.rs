use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use super::{Album, Music, MusicApi, SearchOption, SearchResult};
use crate::colisten::value::Js;

/// How long a handler is willing to block on a remote worker.
const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches one track envelope through a remote worker. The worker posts back
/// the complete `type:"music"` object.
pub(super) async fn get_music(
    api: &MusicApi,
    kind: &str,
    payload: HashMap<String, String>,
) -> Result<Value, String> {
    let task = api.dispatcher.new_task(kind, payload);
    let result = api
        .dispatcher
        .call(task, CALL_TIMEOUT)
        .await
        .ok_or_else(|| format!("{kind} 任务超时"))?;

    if !result.success {
        return Err(result.error.unwrap_or_else(|| "任务执行失败".to_owned()));
    }
    if !result.result.is_object() {
        return Err(format!("{kind} 结果格式错误"));
    }
    Ok(result.result)
}

/// Keyword search served by the bilibili worker. The worker answers with
/// `{total, data: [music…]}`.
pub(super) async fn search_music(
    api: &MusicApi,
    o: &SearchOption,
) -> Result<SearchResult<Music>, String> {
    let payload = HashMap::from([
        ("keyword".to_owned(), o.keyword.clone()),
        ("page".to_owned(), o.page.to_string()),
    ]);
    let task = api.dispatcher.new_task("bilibili:search_music", payload);
    let result = api
        .dispatcher
        .call(task, CALL_TIMEOUT)
        .await
        .ok_or_else(|| "bilibili:search_music 任务超时".to_owned())?;

    if !result.success {
        return Err(result.error.unwrap_or_else(|| "任务执行失败".to_owned()));
    }

    let doc = Js::new(&result.result);
    let mut data = Vec::new();
    doc.get("data").each(|item| {
        data.push(Music {
            id: item.get("id").string(),
            name: item.get("name").string(),
            artist: item.get("artist").string(),
            album: Album {
                name: item.get("album.name").string(),
            },
            duration: item.get("duration").int(),
            privilege: Default::default(),
            cover: item.get("pictureUrl").string(),
            source: "db".to_owned(),
        });
    });
    Ok(SearchResult {
        total: doc.get("total").int().max(data.len() as i64),
        data,
    })
}
