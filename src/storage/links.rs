use bytes::Bytes;
use reqwest::Url;

use super::catalog::{object_key, Catalog, CatalogError, LINKS_OBJECT};
use super::models::SharedLink;
use crate::object_store::ObjectStoreError;

const SEPARATOR: &str = "::";

impl Catalog {
    /// The area's shared links in stored order. A missing list is empty.
    pub async fn list_links(&self, area: &str) -> Result<Vec<SharedLink>, CatalogError> {
        match self.store().get(&object_key(area, LINKS_OBJECT)).await {
            Ok(data) => Ok(parse_links(&String::from_utf8_lossy(&data))),
            Err(ObjectStoreError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append a link, returning it with the index it was written at.
    pub async fn add_link(
        &self,
        area: &str,
        title: &str,
        url: &str,
    ) -> Result<(usize, SharedLink), CatalogError> {
        let link = validate_link(title, url)?;
        let mut links = self.list_links(area).await?;
        let index = links.len();
        links.push(link.clone());
        self.write_links(area, &links).await?;

        tracing::debug!(area = %area, index, title = %link.title, "Added shared link");
        Ok((index, link))
    }

    pub async fn update_link(
        &self,
        area: &str,
        index: usize,
        title: &str,
        url: &str,
    ) -> Result<SharedLink, CatalogError> {
        let link = validate_link(title, url)?;
        let mut links = self.list_links(area).await?;
        let slot = links
            .get_mut(index)
            .ok_or(CatalogError::LinkNotFound(index))?;
        *slot = link.clone();
        self.write_links(area, &links).await?;

        tracing::debug!(area = %area, index, "Updated shared link");
        Ok(link)
    }

    /// Remove the link at `index`, returning it.
    pub async fn delete_link(&self, area: &str, index: usize) -> Result<SharedLink, CatalogError> {
        let mut links = self.list_links(area).await?;
        if index >= links.len() {
            return Err(CatalogError::LinkNotFound(index));
        }
        let removed = links.remove(index);
        self.write_links(area, &links).await?;

        tracing::debug!(area = %area, index, "Deleted shared link");
        Ok(removed)
    }

    /// Rewrite the whole list. Concurrent editors race; the last write wins.
    async fn write_links(&self, area: &str, links: &[SharedLink]) -> Result<(), CatalogError> {
        let text = render_links(links);
        self.store()
            .put(&object_key(area, LINKS_OBJECT), Bytes::from(text))
            .await?;
        Ok(())
    }
}

/// One `title::url` per line; lines without a separator are skipped.
pub fn parse_links(text: &str) -> Vec<SharedLink> {
    text.lines()
        .filter_map(|line| {
            let (title, url) = line.trim().split_once(SEPARATOR)?;
            let (title, url) = (title.trim(), url.trim());
            if title.is_empty() || url.is_empty() {
                return None;
            }
            Some(SharedLink {
                title: title.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

pub fn render_links(links: &[SharedLink]) -> String {
    links
        .iter()
        .map(|l| format!("{}{SEPARATOR}{}\n", l.title, l.url))
        .collect()
}

fn validate_link(title: &str, url: &str) -> Result<SharedLink, CatalogError> {
    let (title, url) = (title.trim(), url.trim());

    if title.is_empty() || url.is_empty() {
        return Err(CatalogError::InvalidLink(
            "title and url are both required".to_string(),
        ));
    }
    // A trailing ':' would merge into the separator when read back.
    if title.contains(SEPARATOR) || title.ends_with(':') || title.contains(['\n', '\r']) {
        return Err(CatalogError::InvalidLink(format!(
            "title must not contain '{SEPARATOR}' or line breaks, nor end with ':'"
        )));
    }

    let parsed = Url::parse(url)
        .map_err(|e| CatalogError::InvalidLink(format!("'{url}' is not a valid URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || url.contains(['\n', '\r']) {
        return Err(CatalogError::InvalidLink(
            "url must start with http:// or https://".to_string(),
        ));
    }

    Ok(SharedLink {
        title: title.to_string(),
        url: url.to_string(),
    })
}
