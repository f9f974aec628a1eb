use super::*;

pub fn repo_path(owner: &str, repo: &str) -> String {
    format!("repos/{}/{}", owner, repo)
}

impl GitHubService {
    pub async fn get_repo(&self, owner: &str, repo: &str) -> ServiceResult<Repo> {
        let url = self.url(&repo_path(owner, repo));
        let response = self.send::<Repo>(RequestConfig::get(url)).await?;
        Ok(response.data)
    }
}
