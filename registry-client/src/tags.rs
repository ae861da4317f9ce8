use serde::{Deserialize, Deserializer};

use crate::authentication::Authentication;
use crate::error::RegistryError;
use crate::transport::{HttpService, Request};
use crate::RegistryClient;

/// The tags of a repository, as returned by `GET /v2/<name>/tags/list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TagList {
    /// The repository name.
    pub name: String,

    /// The tags, in registry order.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl<S, A> RegistryClient<S, A>
where
    S: HttpService,
    A: Authentication,
{
    /// List the tags in the repository.
    ///
    /// Only the first page is read.
    #[tracing::instrument(skip(self), fields(repository = %self.repository().name()))]
    pub async fn tags(&self) -> Result<TagList, RegistryError> {
        let url = self.repository().tags()?;
        let response = self.send(Request::get(url)).await?;

        if let Some(link) = response.header(&http::header::LINK) {
            tracing::warn!(%link, "tag list is paginated, only the first page is used");
        }

        response.json("decoding tag list").await
    }
}
