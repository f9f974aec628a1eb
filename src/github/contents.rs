use super::types::ContentsPayload;
use super::*;

/// An empty `path` lists the repository root and keeps the trailing slash.
pub fn contents_path(owner: &str, repo: &str, path: &str) -> String {
    format!("repos/{}/{}/contents/{}", owner, repo, path)
}

impl GitHubService {
    pub async fn get_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> ServiceResult<Vec<Contents>> {
        let url = self.url(&contents_path(owner, repo, path));
        let response = self.send::<ContentsPayload>(RequestConfig::get(url)).await?;
        Ok(response.data.into_entries())
    }
}
