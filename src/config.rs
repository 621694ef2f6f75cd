//! Command line and environment configuration for the gateway binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use crate::{
    // ---
    gateway::{ResolverState, StaticTokenResolver, TrustedHeaderResolver},
    RpcConfig,
};

#[derive(Parser, Debug, Clone)]
#[command(name = "route-gateway")]
#[command(about = "HTTP gateway forwarding route operations to the route service over a broker")]
pub struct GatewayArgs {
    /// Address the HTTP server listens on.
    #[arg(long, env = "GATEWAY_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Path prefix for every route, e.g. `/routes-api`.
    #[arg(long, env = "SUB_DIRECTORY", default_value = "")]
    pub base_path: String,

    /// Broker URI. Omit to use the in-process transport.
    #[arg(long, env = "RABBITMQ_URI")]
    pub broker_uri: Option<String>,

    /// Exchange requests are published to. Empty means the default exchange.
    #[arg(long, env = "RABBITMQ_EXCHANGE_NAME", default_value = "")]
    pub exchange: String,

    /// Routing key of the route service request queue.
    #[arg(long, env = "RABBITMQ_ROUTING_KEY", default_value = "route-service")]
    pub routing_key: String,

    /// Node id used for the reply queue name. Random when omitted.
    #[arg(long, env = "GATEWAY_NODE_ID")]
    pub node_id: Option<String>,

    /// How long each call waits for the route service.
    #[arg(long, env = "GATEWAY_REQUEST_TIMEOUT_MS", default_value_t = 30_000)]
    pub request_timeout_ms: u64,

    /// Development tokens as `token=user_id`. When set, identities come from
    /// this table instead of the `x-user-id` header.
    #[arg(long = "dev-token", env = "GATEWAY_DEV_TOKENS", value_delimiter = ',', value_parser = parse_token_pair)]
    pub dev_tokens: Vec<(String, String)>,
}

fn parse_token_pair(s: &str) -> Result<(String, String), String> {
    // ---
    match s.split_once('=') {
        Some((token, user)) if !token.is_empty() && !user.is_empty() => {
            Ok((token.to_string(), user.to_string()))
        }
        _ => Err(format!("expected token=user_id, got `{s}`")),
    }
}

impl GatewayArgs {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn to_rpc_config(&self) -> RpcConfig {
        // ---
        let node_id = self
            .node_id
            .clone()
            .unwrap_or_else(|| format!("gateway-{}", uuid::Uuid::new_v4().simple()));

        let mut config = RpcConfig::memory(node_id, self.routing_key.clone())
            .with_exchange(self.exchange.clone())
            .with_request_timeout(self.request_timeout());
        config.transport_uri = self.broker_uri.clone();
        config
    }

    pub fn identity_resolver(&self) -> ResolverState {
        // ---
        if self.dev_tokens.is_empty() {
            return Arc::new(TrustedHeaderResolver);
        }

        let resolver = self
            .dev_tokens
            .iter()
            .fold(StaticTokenResolver::new(), |r, (token, user)| {
                r.with_token(token.clone(), user.clone())
            });
        Arc::new(resolver)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn test_flags_map_to_rpc_config() {
        // ---
        let args = GatewayArgs::try_parse_from([
            "route-gateway",
            "--broker-uri",
            "amqp://localhost:5672/%2f",
            "--exchange",
            "routes",
            "--routing-key",
            "route-requests",
            "--node-id",
            "gw-1",
            "--request-timeout-ms",
            "1500",
        ])
        .unwrap();

        let config = args.to_rpc_config();
        assert_eq!(config.transport_uri.as_deref(), Some("amqp://localhost:5672/%2f"));
        assert_eq!(config.exchange, "routes");
        assert_eq!(config.routing_key, "route-requests");
        assert_eq!(config.node_id, "gw-1");
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert_eq!(config.reply_queue_name(), "responses/gw-1");
    }

    #[test]
    fn test_generated_node_id() {
        // ---
        let args = GatewayArgs::try_parse_from(["route-gateway"]).unwrap();
        assert!(args.to_rpc_config().node_id.starts_with("gateway-"));
    }

    #[test]
    fn test_dev_token_parsing() {
        // ---
        assert_eq!(
            parse_token_pair("abc=alice"),
            Ok(("abc".to_string(), "alice".to_string()))
        );
        assert!(parse_token_pair("abc").is_err());
        assert!(parse_token_pair("=alice").is_err());

        let rejected = GatewayArgs::try_parse_from(["route-gateway", "--dev-token", "broken"]);
        assert!(rejected.is_err());
    }

    #[tokio::test]
    async fn test_dev_tokens_select_static_resolver() {
        // ---
        let args =
            GatewayArgs::try_parse_from(["route-gateway", "--dev-token", "abc=alice,def=bob"])
                .unwrap();
        let resolver = args.identity_resolver();

        let bob = resolver.resolve("def", &HeaderMap::new()).await.unwrap();
        assert_eq!(bob.user_id, "bob");
        assert!(resolver.resolve("zzz", &HeaderMap::new()).await.is_none());
    }
}
