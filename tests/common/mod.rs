#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use relfetch::{Api, FetchConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;

pub const REPO: &str = "owner/tool";

/// Client pointed at `server` for both API and downloads, no retry delay.
pub fn api(server: &MockServer, dir: &Path) -> Api {
    let config = FetchConfig::builder()
        .install_dir(dir)
        .api_base(server.uri())
        .download_base(server.uri())
        .retry_count(2)
        .retry_delay_secs(0)
        .no_progress()
        .build()
        .unwrap();
    Api::new(config)
}

/// Serve `tag` (and `assets`) as the latest release of [`REPO`].
pub fn latest_release(tag: &str, assets: &[&str]) -> Mock {
    let assets: Vec<_> = assets
        .iter()
        .map(|name| serde_json::json!({ "name": name }))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/repos/{REPO}/releases/latest")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "tag_name": tag, "assets": assets })),
        )
}

/// Serve `body` as release asset `asset` of `tag`.
pub fn asset(tag: &str, asset: &str, body: Vec<u8>) -> Mock {
    Mock::given(method("GET"))
        .and(path(format!("/{REPO}/releases/download/{tag}/{asset}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
}

pub fn zip_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// `.tar.gz` with every file under `wrapper/`, including the wrapper entry.
pub fn tar_gz_archive(wrapper: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    let mut dir = tar::Header::new_gnu();
    dir.set_entry_type(tar::EntryType::Directory);
    dir.set_mode(0o755);
    dir.set_size(0);
    builder
        .append_data(&mut dir, format!("{wrapper}/"), std::io::empty())
        .unwrap();

    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(data.len() as u64);
        builder
            .append_data(&mut header, format!("{wrapper}/{name}"), *data)
            .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}
