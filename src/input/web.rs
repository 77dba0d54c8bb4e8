use super::InputSource;
use crate::error::Result;

use std::fs::{self, File};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use zip::ZipArchive;

/// Public head and neck RT dataset used for smoke testing the pipeline.
pub const TEST_DATA_URL: &str = "https://zenodo.org/record/5276878/files/HNSCC.zip";

/// Downloads a file (usually a zip archive of DICOM data) over HTTP.
#[derive(Clone, Debug)]
pub struct WebInput {
    url: String,
    working_directory: PathBuf,
}

impl WebInput {
    pub fn new(url: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            working_directory: working_directory.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn download_file_name(&self) -> String {
        self.url
            .split(['?', '#'])
            .next()
            .and_then(|url| url.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("download")
            .to_string()
    }

    /// Streams the response into `<destination>.part` and renames it once the
    /// body is complete. A failed download leaves nothing behind.
    fn download(&self, destination: &Path) -> Result<()> {
        let partial = partial_path(destination);
        match self.download_to(&partial) {
            Ok(bytes) => {
                fs::rename(&partial, destination)?;
                info!(bytes, path = %destination.display(), "download complete");
                Ok(())
            }
            Err(err) => {
                if let Err(cleanup) = fs::remove_file(&partial) {
                    if cleanup.kind() != ErrorKind::NotFound {
                        warn!(path = %partial.display(), error = %cleanup, "could not remove partial download");
                    }
                }
                Err(err)
            }
        }
    }

    fn download_to(&self, path: &Path) -> Result<u64> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()?;
        let mut response = client.get(&self.url).send()?.error_for_status()?;
        let mut file = File::create(path)?;
        let bytes = response.copy_to(&mut file)?;
        file.sync_all()?;
        Ok(bytes)
    }

    fn extract(&self, archive_path: &Path) -> Result<()> {
        let mut archive = ZipArchive::new(BufReader::new(File::open(archive_path)?))?;
        info!(entries = archive.len(), "extracting archive");
        archive.extract(&self.working_directory)?;
        fs::remove_file(archive_path)?;
        Ok(())
    }
}

impl InputSource for WebInput {
    fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    fn fetch_data(&mut self) -> Result<()> {
        fs::create_dir_all(&self.working_directory)?;
        if fs::read_dir(&self.working_directory)?.next().is_some() {
            info!(
                directory = %self.working_directory.display(),
                "working directory already populated, skipping download"
            );
            return Ok(());
        }

        let destination = self.working_directory.join(self.download_file_name());
        info!(url = %self.url, "downloading data");
        self.download(&destination)?;

        if is_zip_archive(&destination) {
            self.extract(&destination)?;
        }
        Ok(())
    }
}

/// The HNSCC test dataset.
#[derive(Clone, Debug)]
pub struct TestInput {
    inner: WebInput,
}

impl TestInput {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            inner: WebInput::new(TEST_DATA_URL, working_directory),
        }
    }
}

impl InputSource for TestInput {
    fn working_directory(&self) -> &Path {
        self.inner.working_directory()
    }

    fn fetch_data(&mut self) -> Result<()> {
        self.inner.fetch_data()
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    destination.with_file_name(name)
}

fn is_zip_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use tempfile::tempdir;

    /// Serves one request, promising more body than it sends before hanging up.
    fn truncating_server() -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/HNSCC.zip", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request);
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\nPK\x03\x04partial")
                .unwrap();
            stream.flush().unwrap();
        });
        (url, handle)
    }

    #[test]
    fn file_name_comes_from_last_url_segment() {
        let input = WebInput::new("https://example.org/files/HNSCC.zip?download=1", "w");
        assert_eq!(input.download_file_name(), "HNSCC.zip");

        let bare = WebInput::new("https://example.org/", "w");
        assert_eq!(bare.download_file_name(), "download");
    }

    #[test]
    fn populated_working_directory_skips_download() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("existing.dcm"), b"data").unwrap();

        // unroutable URL: any network access would fail the test
        let mut input = WebInput::new("http://127.0.0.1:9/never.zip", dir.path());
        input.fetch_data().unwrap();
    }

    #[test]
    fn archives_are_extracted_and_removed() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("data.zip");
        {
            let mut writer = zip::ZipWriter::new(File::create(&archive_path).unwrap());
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("patient/series/1-1.dcm", options).unwrap();
            writer.write_all(b"not really dicom").unwrap();
            writer.finish().unwrap();
        }

        let input = WebInput::new("http://127.0.0.1:9/data.zip", dir.path());
        input.extract(&archive_path).unwrap();

        assert!(dir.path().join("patient/series/1-1.dcm").is_file());
        assert!(!archive_path.exists());
    }

    #[test]
    fn interrupted_download_leaves_working_directory_empty() {
        let dir = tempdir().unwrap();
        let (url, server) = truncating_server();

        let mut input = WebInput::new(url, dir.path());
        assert!(input.fetch_data().is_err());
        server.join().unwrap();

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn partial_path_keeps_the_file_name() {
        let partial = partial_path(Path::new("working/HNSCC.zip"));
        assert_eq!(partial, Path::new("working/HNSCC.zip.part"));
        assert!(!is_zip_archive(&partial));
    }

    #[test]
    fn test_input_points_at_dataset() {
        let input = TestInput::new("working");
        assert_eq!(input.inner.url(), TEST_DATA_URL);
        assert_eq!(input.working_directory(), Path::new("working"));
    }
}
