use serde_json::Value;

use super::{Album, Music, MusicApi, Playlist, SearchOption, SearchResult, kuwo, web_url};
use crate::colisten::value::Js;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36 Edg/135.0.0.0";

async fn get(api: &MusicApi, path: &str, query: &[(&str, &str)]) -> Result<Value, String> {
    let mut dest = format!("{}{}", api.conf.qq, path);
    if !query.is_empty() {
        let qs = query
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        dest = format!("{dest}?{qs}");
    }

    let response = api
        .client
        .get(dest)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|err| format!("qq {path}: {err}"))?;

    response
        .json::<Value>()
        .await
        .map_err(|err| format!("qq {path} body: {err}"))
}

pub(super) async fn get_music(api: &MusicApi, id: &str) -> Result<Value, String> {
    let detail_doc = get(api, "/song", &[("songmid", id)]).await?;
    let detail = Js::new(&detail_doc).get("data.track_info");
    let lyric_doc = get(api, "/lyric", &[("songmid", id)]).await?;

    let name = detail.get("name").string();
    let artist = join_singers(detail.get("singer"));

    // the qq api serves no stream url, kuwo carries the same catalogue
    let (url, duration) = kuwo::playback_url(api, &format!("{name} {artist}")).await?;

    Ok(serde_json::json!({
        "type": "music",
        "url": url,
        "webUrl": web_url("qq", id),
        "pictureUrl": cover_url(&detail.get("album.mid").string()),
        "duration": duration,
        "source": "qq",
        "lyric": Js::new(&lyric_doc).get("data.lyric").string(),
        "artist": artist,
        "name": name,
        "album": {
            "name": detail.get("album.name").string(),
        },
        "id": id,
    }))
}

pub(super) async fn search_music(api: &MusicApi, o: &SearchOption) -> Result<SearchResult<Music>, String> {
    let r = get(api, "/search", &[("key", o.keyword.as_str())]).await?;
    Ok(collect_music(Js::new(&r).get("data.list"), o))
}

pub(super) async fn search_playlist(
    api: &MusicApi,
    o: &SearchOption,
) -> Result<SearchResult<Playlist>, String> {
    let r = get(api, "/search", &[("key", o.keyword.as_str()), ("t", "2")]).await?;

    let (skip, take) = o.bounds();
    let mut total = 0;
    let mut data = Vec::new();
    Js::new(&r).get("data.list").each(|item| {
        let index = total as usize;
        total += 1;
        if index < skip || data.len() >= take {
            return;
        }
        let creator = item.get("creator");
        data.push(Playlist {
            id: item.get("dissid").string(),
            name: item.get("dissname").string(),
            picture_url: item.get("imgurl").string(),
            desc: item.get("introduction").string(),
            creator: creator.get("name").string(),
            creator_uid: creator.get("creator_uin").string(),
            play_count: item.get("listennum").int(),
            song_count: item.get("song_count").int(),
        });
    });
    Ok(SearchResult { total, data })
}

pub(super) async fn search_user_playlist(
    api: &MusicApi,
    o: &SearchOption,
) -> Result<SearchResult<Playlist>, String> {
    let r = get(api, "/user/songlist", &[("id", o.keyword.as_str())]).await?;

    let (skip, take) = o.bounds();
    let mut total = 0;
    let mut data = Vec::new();
    Js::new(&r).get("data.list").each(|item| {
        let index = total as usize;
        total += 1;
        if index < skip || data.len() >= take {
            return;
        }
        let creator = item.get("creator");
        data.push(Playlist {
            id: item.get("tid").string(),
            name: item.get("diss_name").string(),
            picture_url: item.get("diss_cover").string(),
            desc: item.get("introduction").string(),
            creator: creator.get("name").string(),
            creator_uid: o.keyword.clone(),
            play_count: item.get("listen_num").int(),
            song_count: item.get("song_cnt").int(),
        });
    });
    Ok(SearchResult { total, data })
}

pub(super) async fn get_song_list(
    api: &MusicApi,
    o: &SearchOption,
) -> Result<SearchResult<Music>, String> {
    let r = get(api, "/songlist", &[("id", o.id.as_str())]).await?;
    Ok(collect_music(Js::new(&r).get("data.songlist"), o))
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
            id: item.get("songmid").string(),
            name: item.get("songname").string(),
            artist: join_singers(item.get("singer")),
            album: Album {
                name: item.get("albumname").string(),
            },
            // qq reports seconds
            duration: item.get("interval").int() * 1000,
            privilege: Default::default(),
            cover: cover_url(&item.get("albummid").string()),
            source: String::new(),
        });
    });
    SearchResult { total, data }
}

fn cover_url(album_mid: &str) -> String {
    format!("https://y.gtimg.cn/music/photo_new/T002R300x300M000{album_mid}.jpg")
}

fn join_singers(singers: Js<'_>) -> String {
    let mut joined = String::new();
    singers.each(|singer| {
        if !joined.is_empty() {
            joined.push_str(", ");
        }
        joined.push_str(&singer.get("name").string());
    });
    joined
}
