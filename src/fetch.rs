//! Mirrors the remote tracking folder into the local data directory.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::blocking::Client;

use crate::error::Result;
use crate::walker::{MANIFEST_EXTENSIONS, METADATA_EXTENSIONS};

lazy_static! {
    static ref RE_HREF: Regex = Regex::new(r#"(?i)href\s*=\s*"([^"?#]+)""#).unwrap();
}

/// Basic auth credentials for the remote folder
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

pub struct Fetcher {
    target: PathBuf,
    url: String,
    auth: Option<Credentials>,
    client: Client,
}

/// File names linked from a directory index page, restricted to the given
/// extensions. Parent and sub-directory links are dropped.
pub fn index_links(html: &str, extensions: &[&str]) -> Vec<String> {
    let mut links: Vec<String> = RE_HREF
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|href| !href.ends_with('/'))
        .filter_map(|href| href.rsplit('/').next())
        .filter(|name| {
            Path::new(name)
                .extension()
                .map(|e| {
                    let e = e.to_string_lossy().to_ascii_lowercase();
                    extensions.iter().any(|x| *x == e)
                })
                .unwrap_or(false)
        })
        .map(str::to_string)
        .collect();
    links.sort_unstable();
    links.dedup();
    links
}

impl Fetcher {
    pub fn new(target: &Path, url: &str, auth: Option<Credentials>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        let mut url = url.to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        Ok(Fetcher {
            target: target.to_path_buf(),
            url,
            auth,
            client,
        })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let mut req = self.client.get(url);
        if let Some(auth) = &self.auth {
            req = req.basic_auth(&auth.user, Some(&auth.password));
        }
        Ok(req.send()?.error_for_status()?)
    }

    /// Throw away the local copy and start with an empty directory
    pub fn clean(&self) -> Result<()> {
        if self.target.exists() {
            info!("Removing local copy in {}", self.target.display());
            fs::remove_dir_all(&self.target)?;
        }
        fs::create_dir_all(&self.target)?;
        Ok(())
    }

    /// Download every spreadsheet and manifest linked from the remote folder.
    /// Returns the number of downloaded files.
    pub fn fetch(&self) -> Result<usize> {
        info!("Fetching file list from {}", self.url);
        let index = self.get(&self.url)?.text()?;

        let extensions: Vec<&str> = METADATA_EXTENSIONS
            .iter()
            .chain(MANIFEST_EXTENSIONS.iter())
            .copied()
            .collect();
        let names = index_links(&index, &extensions);
        if names.is_empty() {
            warn!("No metadata or md5 files linked from {}", self.url);
        }

        fs::create_dir_all(&self.target)?;
        for name in &names {
            let url = format!("{}{}", self.url, name);
            let destination = self.target.join(name);
            debug!("Downloading {} to {}", url, destination.display());
            let mut response = self.get(&url)?;
            let mut file = File::create(&destination)?;
            response.copy_to(&mut file)?;
        }
        info!("Fetched {} files into {}", names.len(), self.target.display());
        Ok(names.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"<html><body><h1>Index of /base/tracking/amplicons</h1>
<a href="?C=N;O=D">Name</a>
<a href="../">Parent Directory</a>
<a href="old/">old/</a>
<a href="BASE_16S_AGRF.xlsx">BASE_16S_AGRF.xlsx</a>
<a HREF="AGRF_A810W_checksums.md5">AGRF_A810W_checksums.md5</a>
<a href="/base/tracking/amplicons/UNSW_AMWVG.txt">UNSW_AMWVG.txt</a>
<a href="README.pdf">README.pdf</a>
<a href="BASE_16S_AGRF.xlsx">again</a>
</body></html>"#;

    #[test]
    fn links_from_index_page() {
        let links = index_links(INDEX, &["xlsx", "md5", "txt"]);
        assert_eq!(
            links,
            vec!["AGRF_A810W_checksums.md5", "BASE_16S_AGRF.xlsx", "UNSW_AMWVG.txt"]
        );
    }

    #[test]
    fn clean_leaves_empty_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("amplicon_metadata");
        fs::create_dir_all(target.join("sub"))?;
        File::create(target.join("sub/stale.xlsx"))?;

        let fetcher = Fetcher::new(&target, "https://localhost/amplicons", None)?;
        fetcher.clean()?;
        assert!(target.is_dir());
        assert_eq!(fs::read_dir(&target)?.count(), 0);
        Ok(())
    }
}
