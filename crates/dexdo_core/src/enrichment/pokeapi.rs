//! HTTP client for the PokeAPI `pokemon` endpoint.

use super::{CreatureLookup, CreatureRecord, LookupError};
use crate::config::LookupConfig;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PokemonResponse {
    name: String,
    #[serde(default)]
    types: Vec<TypeSlot>,
    #[serde(default)]
    stats: Vec<StatEntry>,
    #[serde(default)]
    sprites: Sprites,
}

#[derive(Debug, Deserialize)]
struct TypeSlot {
    slot: u32,
    #[serde(rename = "type")]
    kind: NamedResource,
}

#[derive(Debug, Deserialize)]
struct StatEntry {
    base_stat: u32,
    stat: NamedResource,
}

#[derive(Debug, Deserialize)]
struct NamedResource {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Sprites {
    front_default: Option<String>,
}

impl From<PokemonResponse> for CreatureRecord {
    fn from(mut value: PokemonResponse) -> Self {
        value.types.sort_by_key(|slot| slot.slot);
        Self {
            name: value.name,
            types: value.types.into_iter().map(|slot| slot.kind.name).collect(),
            stats: value
                .stats
                .into_iter()
                .map(|entry| (entry.stat.name, entry.base_stat))
                .collect(),
            image_url: value.sprites.front_default.filter(|url| !url.is_empty()),
        }
    }
}

/// `CreatureLookup` over `GET {base_url}/pokemon/{key}`.
///
/// The key always travels as one percent-encoded path segment.
pub struct PokeApiClient {
    client: Client,
    base_url: Url,
}

impl PokeApiClient {
    /// Builds a client with the configured base URL and request timeout.
    pub fn new(config: &LookupConfig) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| LookupError::Transport(err.to_string()))?;
        let base_url = Url::parse(config.base_url.trim())
            .map_err(|err| LookupError::Transport(format!("invalid lookup base url: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(LookupError::Transport(format!(
                "lookup base url cannot carry a path: {base_url}"
            )));
        }
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, key: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("pokemon").push(key);
        }
        url
    }
}

#[async_trait]
impl CreatureLookup for PokeApiClient {
    async fn lookup(&self, key: &str) -> Result<CreatureRecord, LookupError> {
        // Dot segments would be dropped from the path and hit the listing.
        if key.is_empty() || key == "." || key == ".." {
            return Err(LookupError::NotFound(key.to_string()));
        }

        let response = self
            .client
            .get(self.endpoint(key))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            return Err(LookupError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.json::<PokemonResponse>().await.map_err(|err| {
            if err.is_timeout() {
                LookupError::Timeout
            } else {
                LookupError::Malformed(err.to_string())
            }
        })?;
        if body.types.is_empty() && body.stats.is_empty() {
            return Err(LookupError::Malformed(
                "response carries neither types nor stats".to_string(),
            ));
        }
        debug!("event=pokeapi_lookup module=enrichment status=ok");
        Ok(body.into())
    }
}

fn map_transport_error(err: reqwest::Error) -> LookupError {
    if err.is_timeout() {
        LookupError::Timeout
    } else {
        LookupError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::PokeApiClient;
    use crate::config::LookupConfig;
    use crate::enrichment::{CreatureLookup, LookupError};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, timeout: Duration) -> PokeApiClient {
        PokeApiClient::new(&LookupConfig {
            base_url: format!("{}/", server.uri()),
            timeout,
        })
        .expect("client should build")
    }

    #[tokio::test]
    async fn parses_pokemon_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon/pikachu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "pikachu",
                "types": [{"slot": 1, "type": {"name": "electric", "url": "x"}}],
                "stats": [
                    {"base_stat": 35, "effort": 0, "stat": {"name": "hp"}},
                    {"base_stat": 90, "effort": 2, "stat": {"name": "speed"}}
                ],
                "sprites": {"front_default": "https://img.example/25.png"}
            })))
            .mount(&server)
            .await;

        let record = client_for(&server, Duration::from_secs(2))
            .lookup("pikachu")
            .await
            .expect("lookup should succeed");
        assert_eq!(record.name, "pikachu");
        assert_eq!(record.types, vec!["electric".to_string()]);
        assert_eq!(record.stats.len(), 2);
        assert_eq!(record.image_url.as_deref(), Some("https://img.example/25.png"));
    }

    #[tokio::test]
    async fn maps_404_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_secs(2))
            .lookup("pikachu99")
            .await
            .expect_err("unknown name should fail");
        assert_eq!(err, LookupError::NotFound("pikachu99".to_string()));
    }

    #[tokio::test]
    async fn maps_server_errors_and_bad_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pokemon/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(2));
        assert!(matches!(
            client.lookup("broken").await,
            Err(LookupError::Malformed(_))
        ));
        assert_eq!(
            client.lookup("down").await,
            Err(LookupError::Http { status: 503 })
        );
    }

    #[tokio::test]
    async fn key_with_path_characters_stays_one_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/berry/cheri"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "cheri"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_secs(2))
            .lookup("../berry/cheri")
            .await
            .expect_err("key must not reach another resource");
        assert_eq!(err, LookupError::NotFound("../berry/cheri".to_string()));

        let requests = server.received_requests().await.expect("recording enabled");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.path(), "/pokemon/..%2Fberry%2Fcheri");
    }

    #[tokio::test]
    async fn dot_keys_are_not_sent() {
        let server = MockServer::start().await;
        let client = client_for(&server, Duration::from_secs(2));

        assert_eq!(
            client.lookup("..").await,
            Err(LookupError::NotFound("..".to_string()))
        );
        let requests = server.received_requests().await.expect("recording enabled");
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn payload_without_types_or_stats_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon/cheri"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "cheri",
                "firmness": {"name": "soft"}
            })))
            .mount(&server)
            .await;

        let result = client_for(&server, Duration::from_secs(2))
            .lookup("cheri")
            .await;
        assert!(matches!(result, Err(LookupError::Malformed(_))));
    }

    #[tokio::test]
    async fn rejects_unparseable_base_url() {
        let result = PokeApiClient::new(&LookupConfig {
            base_url: "not a url".to_string(),
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(LookupError::Transport(_))));
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_millis(200))
            .lookup("slowpoke")
            .await
            .expect_err("slow response should time out");
        assert_eq!(err, LookupError::Timeout);
    }
}
