use serde_json::{Value, json};

use super::{Album, Music, MusicApi, Playlist, SearchOption, SearchResult, web_url};
use crate::colisten::value::Js;

const TYPE_SONG: i64 = 1;
const TYPE_PLAYLIST: i64 = 1000;

/// POST to the configured netease proxy. The account cookie rides in the
/// body; url-returning endpoints are cache-busted with a timestamp because
/// their answers expire.
async fn post(api: &MusicApi, path: &str, mut body: Value, timestamp: bool) -> Result<Value, String> {
    if let Value::Object(map) = &mut body {
        map.insert("cookie".to_owned(), Value::String(api.conf.cookie.clone()));
    }

    let dest = if timestamp {
        format!(
            "{}{}?timestamp={}",
            api.conf.netease,
            path,
            chrono::Utc::now().timestamp_millis()
        )
    } else {
        format!("{}{}", api.conf.netease, path)
    };

    let response = api
        .client
        .post(dest)
        .json(&body)
        .send()
        .await
        .map_err(|err| format!("netease {path}: {err}"))?;

    response
        .json::<Value>()
        .await
        .map_err(|err| format!("netease {path} body: {err}"))
}

pub(super) async fn get_music(api: &MusicApi, id: &str) -> Result<Value, String> {
    // 320kbps preview url, falling back to the download url
    let preview = post(api, "/song/url/v1", json!({"level": "exhigh", "id": id}), true).await?;
    let mut url = Js::new(&preview).get("data.0.url").string();
    if url.is_empty() {
        let download = post(
            api,
            "/song/download/url/v1",
            json!({"level": "exhigh", "id": id}),
            true,
        )
        .await?;
        url = Js::new(&download).get("data.url").string();
    }

    let detail_doc = post(api, "/song/detail", json!({"ids": id}), true).await?;
    let detail = Js::new(&detail_doc).get("songs.0");
    let lyric_doc = post(api, "/lyric", json!({"id": id}), true).await?;

    Ok(json!({
        "type": "music",
        "url": url,
        "webUrl": web_url("wy", id),
        "pictureUrl": detail.get("al.picUrl").string(),
        "duration": detail.get("dt").int(),
        "source": "wy",
        "lyric": Js::new(&lyric_doc).get("lrc.lyric").string(),
        "artist": join_artists(detail.get("ar")),
        "name": detail.get("name").string(),
        "album": {
            "name": detail.get("al.name").string(),
        },
        "id": id,
    }))
}

pub(super) async fn search_music(api: &MusicApi, o: &SearchOption) -> Result<SearchResult<Music>, String> {
    let r = post(
        api,
        "/cloudsearch",
        json!({"keywords": o.keyword, "type": TYPE_SONG}),
        true,
    )
    .await?;
    Ok(collect_music(Js::new(&r).get("result.songs"), o))
}

pub(super) async fn search_playlist(
    api: &MusicApi,
    o: &SearchOption,
) -> Result<SearchResult<Playlist>, String> {
    let r = post(
        api,
        "/cloudsearch",
        json!({"keywords": o.keyword, "type": TYPE_PLAYLIST}),
        false,
    )
    .await?;

    let (skip, take) = o.bounds();
    let mut total = 0;
    let mut data = Vec::new();
    Js::new(&r).get("result.playlists").each(|item| {
        let index = total as usize;
        total += 1;
        if index < skip || data.len() >= take {
            return;
        }
        let creator = item.get("creator");
        data.push(Playlist {
            id: item.get("id").string(),
            name: item.get("name").string(),
            picture_url: item.get("coverImgUrl").string(),
            desc: item.get("description").string(),
            creator: creator.get("nickname").string(),
            creator_uid: creator.get("userId").string(),
            play_count: item.get("playCount").int(),
            song_count: item.get("trackCount").int(),
        });
    });
    Ok(SearchResult { total, data })
}

pub(super) async fn get_song_list(
    api: &MusicApi,
    o: &SearchOption,
) -> Result<SearchResult<Music>, String> {
    let r = post(api, "/playlist/track/all", json!({"id": o.id}), true).await?;
    Ok(collect_music(Js::new(&r).get("songs"), o))
}

/// Ids of up to a handful of tracks the upstream considers similar to `id`.
pub(super) async fn similar(api: &MusicApi, id: &str) -> Result<Vec<String>, String> {
    let r = post(api, "/simi/song", json!({"id": id}), true).await?;
    let mut ids = Vec::with_capacity(5);
    Js::new(&r).get("songs").each(|song| {
        let id = song.get("id").string();
        if !id.is_empty() {
            ids.push(id);
        }
    });
    Ok(ids)
}

fn collect_music(items: Js<'_>, o: &SearchOption) -> SearchResult<Music> {
    let (skip, take) = o.bounds();
    let mut total = 0;
    let mut data = Vec::new();
    items.each(|item| {
        let index = total as usize;
        total += 1;
        if index < skip || data.len() >= take {
            return;
        }
        data.push(Music {
            id: item.get("id").string(),
            name: item.get("name").string(),
            artist: join_artists(item.get("ar")),
            album: Album {
                name: item.get("al.name").string(),
            },
            duration: item.get("dt").int(),
            privilege: Default::default(),
            cover: item.get("al.picUrl").string(),
            source: String::new(),
        });
    });
    SearchResult { total, data }
}

fn join_artists(artists: Js<'_>) -> String {
    let mut joined = String::new();
    artists.each(|artist| {
        if !joined.is_empty() {
            joined.push_str(", ");
        }
        joined.push_str(&artist.get("name").string());
    });
    joined
}
