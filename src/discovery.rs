//! One-shot capability oracle (spec §4.5): which optional APIs exist and
//! are reachable, plus a provider/zone hint taken from the first observed
//! node. Runs once at startup, never again — unlike every collector, it
//! performs no long-lived I/O.

use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams, PostParams};
use kube::discovery::Discovery;
use kube::Client;
use tracing::warn;

/// `aws`/`gcp`/`azure` are recognised by provider-id prefix; anything else
/// (including no nodes observed yet) is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Gcp,
    Azure,
    Unknown,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Gcp => "gcp",
            Provider::Azure => "azure",
            Provider::Unknown => "unknown",
        }
    }

    pub fn from_provider_id(provider_id: &str) -> Self {
        if provider_id.starts_with("aws://") {
            Provider::Aws
        } else if provider_id.starts_with("gce://") {
            Provider::Gcp
        } else if provider_id.starts_with("azure://") {
            Provider::Azure
        } else {
            Provider::Unknown
        }
    }
}

#[derive(Debug, Clone)]
pub struct Capabilities {
    pub metrics_server: bool,
    pub vpa: bool,
    pub karpenter: bool,
    pub provider: Provider,
    pub zone: Option<String>,
    pub dcgm_exporter: bool,
    /// Populated either from a static config override or, if
    /// `dcgm_exporter` was detected live, left empty for the GPU collector
    /// to resolve per-tick (endpoint membership tracks node membership).
    pub dcgm_exporter_endpoints: Vec<String>,
}

/// A `(group, version, resource kind)` the three-phase probe checks for.
struct ProbeTarget {
    group: &'static str,
    version: &'static str,
    kind: &'static str,
    verb: &'static str,
}

const METRICS_SERVER: ProbeTarget = ProbeTarget {
    group: "metrics.k8s.io",
    version: "v1beta1",
    kind: "NodeMetrics",
    verb: "list",
};
const VPA: ProbeTarget = ProbeTarget {
    group: "autoscaling.k8s.io",
    version: "v1",
    kind: "VerticalPodAutoscaler",
    verb: "list",
};
const KARPENTER: ProbeTarget = ProbeTarget {
    group: "karpenter.sh",
    version: "v1",
    kind: "NodePool",
    verb: "list",
};

pub async fn discover(client: Client, static_dcgm_endpoints: Vec<String>) -> Capabilities {
    let discovery = match Discovery::new(client.clone()).run().await {
        Ok(d) => Some(d),
        Err(err) => {
            warn!(error = %err, "api discovery failed, optional capabilities default to false");
            None
        }
    };

    let metrics_server = probe(&client, discovery.as_ref(), &METRICS_SERVER).await;
    let vpa = probe(&client, discovery.as_ref(), &VPA).await;
    let karpenter = probe(&client, discovery.as_ref(), &KARPENTER).await;

    let (provider, zone) = detect_provider(&client).await;

    let dcgm_exporter = !static_dcgm_endpoints.is_empty();

    Capabilities {
        metrics_server,
        vpa,
        karpenter,
        provider,
        zone,
        dcgm_exporter,
        dcgm_exporter_endpoints: static_dcgm_endpoints,
    }
}

/// Three phases, each of which can independently fail closed: (1) the API
/// group is present in discovery, (2) the resource exists in that group's
/// preferred version, (3) a `SelfSubjectAccessReview` confirms we can
/// actually call the target verb. Any network/permission failure at any
/// phase yields `false`, never an error — discovery must not abort startup.
async fn probe(client: &Client, discovery: Option<&Discovery>, target: &ProbeTarget) -> bool {
    let Some(discovery) = discovery else { return false };

    let group_present = discovery.groups().any(|g| g.name() == target.group);
    if !group_present {
        return false;
    }

    let resource_present = discovery.groups().filter(|g| g.name() == target.group).any(|g| {
        g.recommended_resources()
            .into_iter()
            .any(|(ar, _caps)| ar.kind == target.kind)
    });
    if !resource_present {
        return false;
    }

    can_i(client, target).await
}

async fn can_i(client: &Client, target: &ProbeTarget) -> bool {
    let review = SelfSubjectAccessReview {
        spec: SelfSubjectAccessReviewSpec {
            resource_attributes: Some(ResourceAttributes {
                group: Some(target.group.to_string()),
                verb: Some(target.verb.to_string()),
                resource: Some(plural(target.kind)),
                ..Default::default()
            }),
            ..Default::default()
        },
        ..Default::default()
    };

    let api: Api<SelfSubjectAccessReview> = Api::all(client.clone());
    match api.create(&PostParams::default(), &review).await {
        Ok(reviewed) => reviewed.status.map(|s| s.allowed).unwrap_or(false),
        Err(err) => {
            warn!(kind = target.kind, error = %err, "self-subject-access-review failed");
            false
        }
    }
}

/// Crude kind→resource pluralization, sufficient for the fixed handful of
/// kinds this module probes — not a general inflector.
fn plural(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') {
        lower
    } else {
        format!("{lower}s")
    }
}

async fn detect_provider(client: &Client) -> (Provider, Option<String>) {
    let api: Api<Node> = Api::all(client.clone());
    let nodes = match api.list(&ListParams::default().limit(1)).await {
        Ok(list) => list.items,
        Err(err) => {
            warn!(error = %err, "node list for provider detection failed");
            return (Provider::Unknown, None);
        }
    };

    let Some(node) = nodes.into_iter().next() else {
        return (Provider::Unknown, None);
    };

    let provider = node
        .spec
        .as_ref()
        .and_then(|s| s.provider_id.as_deref())
        .map(Provider::from_provider_id)
        .unwrap_or_else(|| provider_from_labels(&node));

    let zone = node_zone(&node);
    (provider, zone)
}

fn provider_from_labels(node: &Node) -> Provider {
    use kube::ResourceExt;
    let labels = node.labels();
    if labels.keys().any(|k| k.starts_with("eks.amazonaws.com")) {
        Provider::Aws
    } else if labels.keys().any(|k| k.starts_with("cloud.google.com")) {
        Provider::Gcp
    } else if labels.keys().any(|k| k.starts_with("kubernetes.azure.com")) {
        Provider::Azure
    } else {
        Provider::Unknown
    }
}

fn node_zone(node: &Node) -> Option<String> {
    use kube::ResourceExt;
    let labels = node.labels();
    labels
        .get("topology.kubernetes.io/zone")
        .or_else(|| labels.get("failure-domain.beta.kubernetes.io/zone"))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_provider_id_prefixes() {
        assert_eq!(Provider::from_provider_id("aws:///us-east-1a/i-0123"), Provider::Aws);
        assert_eq!(Provider::from_provider_id("gce://proj/us-central1-a/node-1"), Provider::Gcp);
        assert_eq!(Provider::from_provider_id("azure:///subscriptions/x"), Provider::Azure);
        assert_eq!(Provider::from_provider_id("bare-metal://node-1"), Provider::Unknown);
    }

    #[test]
    fn pluralizes_known_kinds() {
        assert_eq!(plural("NodeMetrics"), "nodemetrics");
        assert_eq!(plural("VerticalPodAutoscaler"), "verticalpodautoscalers");
    }
}
