//! Per-entity-kind collector constructors. Each one wires a
//! `WatchCollector<K, V>` with a translation closure from the k8s-openapi
//! wire type `K` to our domain type `V` and a projection into the matching
//! `Store` field.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::apps::v1 as apps;
use k8s_openapi::api::autoscaling::v2 as autoscaling;
use k8s_openapi::api::batch::v1 as batch;
use k8s_openapi::api::core::v1 as core;
use k8s_openapi::api::networking::v1 as networking;
use k8s_openapi::api::policy::v1 as policy;
use k8s_openapi::api::scheduling::v1 as scheduling;
use k8s_openapi::api::storage::v1 as storage;
use kube::api::DynamicObject;
use kube::{Api, Client, ResourceExt};

use crate::model::*;
use crate::observability::Metrics;
use crate::store::Store;

use super::convert::*;
use super::crd::DynamicPollCollector;
use super::watch::WatchCollector;
use super::Collector;

fn sel(selector: Option<&std::collections::BTreeMap<String, String>>) -> BTreeMap<String, String> {
    selector.cloned().unwrap_or_default()
}

pub fn nodes(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<core::Node> = Api::all(client);
    let translate = Arc::new(|n: &core::Node| -> Option<Node> {
        let status = n.status.as_ref()?;
        let capacity = status.capacity.as_ref();
        let allocatable = status.allocatable.as_ref();
        let ready = status
            .conditions
            .as_ref()
            .map(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
            .unwrap_or(false);
        Some(Node {
            uid: object_uid(n),
            name: n.name_any(),
            labels: labels_map(n.labels()),
            provider_id: n.spec.as_ref().and_then(|s| s.provider_id.clone()),
            zone: n
                .labels()
                .get("topology.kubernetes.io/zone")
                .or_else(|| n.labels().get("failure-domain.beta.kubernetes.io/zone"))
                .cloned(),
            cpu_capacity_cores: cpu_cores(capacity.and_then(|c| c.get("cpu"))).unwrap_or(0.0),
            memory_capacity_bytes: memory_bytes(capacity.and_then(|c| c.get("memory"))).unwrap_or(0),
            cpu_allocatable_cores: cpu_cores(allocatable.and_then(|c| c.get("cpu"))).unwrap_or(0.0),
            memory_allocatable_bytes: memory_bytes(allocatable.and_then(|c| c.get("memory"))).unwrap_or(0),
            ready,
            ..Default::default()
        })
    });
    let key_of = Arc::new(|v: &Node| v.name.clone());
    Arc::new(WatchCollector::new(
        "nodes",
        api,
        translate,
        key_of,
        |s| &s.nodes,
        store,
        metrics,
    ))
}

pub fn pods(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<core::Pod> = Api::all(client);
    let translate = Arc::new(|p: &core::Pod| -> Option<Pod> {
        let spec = p.spec.as_ref()?;
        let status = p.status.as_ref();
        let statuses_by_name: std::collections::HashMap<&str, &core::ContainerStatus> = status
            .and_then(|s| s.container_statuses.as_ref())
            .map(|v| v.iter().map(|cs| (cs.name.as_str(), cs)).collect())
            .unwrap_or_default();
        let init_statuses_by_name: std::collections::HashMap<&str, &core::ContainerStatus> = status
            .and_then(|s| s.init_container_statuses.as_ref())
            .map(|v| v.iter().map(|cs| (cs.name.as_str(), cs)).collect())
            .unwrap_or_default();

        let owner = p
            .owner_references()
            .first()
            .map(|o| OwnerRef {
                kind: o.kind.clone(),
                name: o.name.clone(),
                uid: Some(o.uid.clone()),
            })
            .unwrap_or_default();

        Some(Pod {
            uid: object_uid(p),
            name: p.name_any(),
            namespace: p.namespace().unwrap_or_default(),
            node_name: spec.node_name.clone(),
            phase: status.and_then(|s| s.phase.clone()).unwrap_or_else(|| "Unknown".into()),
            containers: spec
                .containers
                .iter()
                .map(|c| container_from_spec(c, statuses_by_name.get(c.name.as_str()).copied()))
                .collect(),
            init_containers: spec
                .init_containers
                .as_ref()
                .map(|cs| {
                    cs.iter()
                        .map(|c| container_from_spec(c, init_statuses_by_name.get(c.name.as_str()).copied()))
                        .collect()
                })
                .unwrap_or_default(),
            owner_kind: owner.kind,
            owner_name: owner.name,
            owner_uid: owner.uid,
            owner_cron_job: None,
            labels: labels_map(p.labels()),
            created_at: p
                .creation_timestamp()
                .map(|t| t.0)
                .unwrap_or_else(chrono::Utc::now),
        })
    });
    let key_of = Arc::new(|v: &Pod| crate::model::keys::namespaced_key(&v.namespace, &v.name));
    Arc::new(WatchCollector::new(
        "pods",
        api,
        translate,
        key_of,
        |s| &s.pods,
        store,
        metrics,
    ))
}

pub fn namespaces(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<core::Namespace> = Api::all(client);
    let translate = Arc::new(|n: &core::Namespace| -> Option<Namespace> {
        Some(Namespace {
            uid: object_uid(n),
            name: n.name_any(),
            labels: labels_map(n.labels()),
        })
    });
    let key_of = Arc::new(|v: &Namespace| v.name.clone());
    Arc::new(WatchCollector::new(
        "namespaces",
        api,
        translate,
        key_of,
        |s| &s.namespaces,
        store,
        metrics,
    ))
}

macro_rules! workload_collector {
    ($fn_name:ident, $kind:literal, $k8s_ty:ty, $model_ty:ident, $field:ident, $replicas:expr) => {
        pub fn $fn_name(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
            let api: Api<$k8s_ty> = Api::all(client);
            let translate = Arc::new(|o: &$k8s_ty| -> Option<$model_ty> {
                let spec = o.spec.as_ref()?;
                let (desired, ready) = $replicas(o, spec);
                Some($model_ty {
                    uid: object_uid(o),
                    name: o.name_any(),
                    namespace: o.namespace().unwrap_or_default(),
                    selector: sel(spec.selector.match_labels.as_ref()),
                    labels: labels_map(o.labels()),
                    desired_replicas: desired,
                    ready_replicas: ready,
                    totals: None,
                })
            });
            let key_of = Arc::new(|v: &$model_ty| crate::model::keys::namespaced_key(&v.namespace, &v.name));
            Arc::new(WatchCollector::new(
                $kind,
                api,
                translate,
                key_of,
                |s| &s.$field,
                store,
                metrics,
            ))
        }
    };
}

workload_collector!(
    deployments,
    "deployments",
    apps::Deployment,
    Deployment,
    deployments,
    |o: &apps::Deployment, spec: &apps::DeploymentSpec| {
        (
            spec.replicas.unwrap_or(0),
            o.status.as_ref().map(|s| s.ready_replicas.unwrap_or(0)).unwrap_or(0),
        )
    }
);

workload_collector!(
    stateful_sets,
    "statefulsets",
    apps::StatefulSet,
    StatefulSet,
    stateful_sets,
    |o: &apps::StatefulSet, spec: &apps::StatefulSetSpec| {
        (
            spec.replicas.unwrap_or(0),
            o.status.as_ref().map(|s| s.ready_replicas.unwrap_or(0)).unwrap_or(0),
        )
    }
);

workload_collector!(
    daemon_sets,
    "daemonsets",
    apps::DaemonSet,
    DaemonSet,
    daemon_sets,
    |o: &apps::DaemonSet, _spec: &apps::DaemonSetSpec| {
        let status = o.status.as_ref();
        (
            status.map(|s| s.desired_number_scheduled).unwrap_or(0),
            status.map(|s| s.number_ready).unwrap_or(0),
        )
    }
);

pub fn replica_sets(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<apps::ReplicaSet> = Api::all(client);
    let translate = Arc::new(|o: &apps::ReplicaSet| -> Option<ReplicaSet> {
        let owner = first_owner(o.owner_references());
        Some(ReplicaSet {
            uid: object_uid(o),
            name: o.name_any(),
            namespace: o.namespace().unwrap_or_default(),
            owner_kind: owner.kind,
            owner_name: owner.name,
            owner_uid: owner.uid,
        })
    });
    let key_of = Arc::new(|v: &ReplicaSet| crate::model::keys::namespaced_key(&v.namespace, &v.name));
    Arc::new(WatchCollector::new(
        "replicasets",
        api,
        translate,
        key_of,
        |s| &s.replica_sets,
        store,
        metrics,
    ))
}

pub fn jobs(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<batch::Job> = Api::all(client);
    let translate = Arc::new(|o: &batch::Job| -> Option<Job> {
        let owner = first_owner(o.owner_references());
        let status = o.status.as_ref();
        Some(Job {
            uid: object_uid(o),
            name: o.name_any(),
            namespace: o.namespace().unwrap_or_default(),
            owner_cron_job: (owner.kind == "CronJob").then_some(owner.name),
            active: status.and_then(|s| s.active).unwrap_or(0),
            succeeded: status.and_then(|s| s.succeeded).unwrap_or(0),
            failed: status.and_then(|s| s.failed).unwrap_or(0),
            totals: None,
        })
    });
    let key_of = Arc::new(|v: &Job| crate::model::keys::namespaced_key(&v.namespace, &v.name));
    Arc::new(WatchCollector::new(
        "jobs",
        api,
        translate,
        key_of,
        |s| &s.jobs,
        store,
        metrics,
    ))
}

pub fn cron_jobs(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<batch::CronJob> = Api::all(client);
    let translate = Arc::new(|o: &batch::CronJob| -> Option<CronJob> {
        let spec = o.spec.as_ref()?;
        Some(CronJob {
            uid: object_uid(o),
            name: o.name_any(),
            namespace: o.namespace().unwrap_or_default(),
            schedule: spec.schedule.clone(),
            suspended: spec.suspend.unwrap_or(false),
        })
    });
    let key_of = Arc::new(|v: &CronJob| crate::model::keys::namespaced_key(&v.namespace, &v.name));
    Arc::new(WatchCollector::new(
        "cronjobs",
        api,
        translate,
        key_of,
        |s| &s.cron_jobs,
        store,
        metrics,
    ))
}

pub fn services(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<core::Service> = Api::all(client);
    let translate = Arc::new(|o: &core::Service| -> Option<Service> {
        let spec = o.spec.as_ref()?;
        Some(Service {
            uid: object_uid(o),
            name: o.name_any(),
            namespace: o.namespace().unwrap_or_default(),
            selector: sel(spec.selector.as_ref()),
            service_type: spec.type_.clone().unwrap_or_else(|| "ClusterIP".into()),
            target_workloads: Vec::new(),
        })
    });
    let key_of = Arc::new(|v: &Service| crate::model::keys::namespaced_key(&v.namespace, &v.name));
    Arc::new(WatchCollector::new(
        "services",
        api,
        translate,
        key_of,
        |s| &s.services,
        store,
        metrics,
    ))
}

pub fn ingresses(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<networking::Ingress> = Api::all(client);
    let translate = Arc::new(|o: &networking::Ingress| -> Option<Ingress> {
        let hosts = o
            .spec
            .as_ref()
            .and_then(|s| s.rules.as_ref())
            .map(|rules| rules.iter().filter_map(|r| r.host.clone()).collect())
            .unwrap_or_default();
        Some(Ingress {
            uid: object_uid(o),
            name: o.name_any(),
            namespace: o.namespace().unwrap_or_default(),
            hosts,
            ingress_class: o.spec.as_ref().and_then(|s| s.ingress_class_name.clone()),
        })
    });
    let key_of = Arc::new(|v: &Ingress| crate::model::keys::namespaced_key(&v.namespace, &v.name));
    Arc::new(WatchCollector::new(
        "ingresses",
        api,
        translate,
        key_of,
        |s| &s.ingresses,
        store,
        metrics,
    ))
}

pub fn persistent_volumes(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<core::PersistentVolume> = Api::all(client);
    let translate = Arc::new(|o: &core::PersistentVolume| -> Option<PersistentVolume> {
        let spec = o.spec.as_ref()?;
        Some(PersistentVolume {
            uid: object_uid(o),
            name: o.name_any(),
            capacity_bytes: memory_bytes(spec.capacity.as_ref().and_then(|c| c.get("storage"))).unwrap_or(0),
            storage_class: spec.storage_class_name.clone(),
            bound_claim: spec.claim_ref.as_ref().map(|r| r.name.clone().unwrap_or_default()),
            phase: o.status.as_ref().and_then(|s| s.phase.clone()).unwrap_or_default(),
        })
    });
    let key_of = Arc::new(|v: &PersistentVolume| v.name.clone());
    Arc::new(WatchCollector::new(
        "persistentvolumes",
        api,
        translate,
        key_of,
        |s| &s.persistent_volumes,
        store,
        metrics,
    ))
}

pub fn persistent_volume_claims(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<core::PersistentVolumeClaim> = Api::all(client);
    let translate = Arc::new(|o: &core::PersistentVolumeClaim| -> Option<PersistentVolumeClaim> {
        let spec = o.spec.as_ref()?;
        Some(PersistentVolumeClaim {
            uid: object_uid(o),
            name: o.name_any(),
            namespace: o.namespace().unwrap_or_default(),
            requested_bytes: memory_bytes(
                spec.resources
                    .as_ref()
                    .and_then(|r| r.requests.as_ref())
                    .and_then(|r| r.get("storage")),
            )
            .unwrap_or(0),
            bound_volume: spec.volume_name.clone(),
            storage_class: spec.storage_class_name.clone(),
            phase: o.status.as_ref().and_then(|s| s.phase.clone()).unwrap_or_default(),
            mounted_by_pods: Vec::new(),
        })
    });
    let key_of = Arc::new(|v: &PersistentVolumeClaim| crate::model::keys::namespaced_key(&v.namespace, &v.name));
    Arc::new(WatchCollector::new(
        "persistentvolumeclaims",
        api,
        translate,
        key_of,
        |s| &s.persistent_volume_claims,
        store,
        metrics,
    ))
}

pub fn storage_classes(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<storage::StorageClass> = Api::all(client);
    let translate = Arc::new(|o: &storage::StorageClass| -> Option<StorageClass> {
        Some(StorageClass {
            name: o.name_any(),
            provisioner: o.provisioner.clone(),
            is_default: o
                .annotations()
                .get("storageclass.kubernetes.io/is-default-class")
                .map(|v| v == "true")
                .unwrap_or(false),
        })
    });
    let key_of = Arc::new(|v: &StorageClass| v.name.clone());
    Arc::new(WatchCollector::new(
        "storageclasses",
        api,
        translate,
        key_of,
        |s| &s.storage_classes,
        store,
        metrics,
    ))
}

pub fn priority_classes(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<scheduling::PriorityClass> = Api::all(client);
    let translate = Arc::new(|o: &scheduling::PriorityClass| -> Option<PriorityClass> {
        Some(PriorityClass {
            name: o.name_any(),
            value: o.value,
            global_default: o.global_default.unwrap_or(false),
        })
    });
    let key_of = Arc::new(|v: &PriorityClass| v.name.clone());
    Arc::new(WatchCollector::new(
        "priorityclasses",
        api,
        translate,
        key_of,
        |s| &s.priority_classes,
        store,
        metrics,
    ))
}

pub fn limit_ranges(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<core::LimitRange> = Api::all(client);
    let translate = Arc::new(|o: &core::LimitRange| -> Option<LimitRange> {
        Some(LimitRange {
            uid: object_uid(o),
            name: o.name_any(),
            namespace: o.namespace().unwrap_or_default(),
        })
    });
    let key_of = Arc::new(|v: &LimitRange| crate::model::keys::namespaced_key(&v.namespace, &v.name));
    Arc::new(WatchCollector::new(
        "limitranges",
        api,
        translate,
        key_of,
        |s| &s.limit_ranges,
        store,
        metrics,
    ))
}

pub fn resource_quotas(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<core::ResourceQuota> = Api::all(client);
    let translate = Arc::new(|o: &core::ResourceQuota| -> Option<ResourceQuota> {
        let status = o.status.as_ref();
        let to_map = |m: &std::collections::BTreeMap<String, k8s_openapi::apimachinery::pkg::api::resource::Quantity>| {
            m.iter().map(|(k, v)| (k.clone(), v.0.clone())).collect()
        };
        Some(ResourceQuota {
            uid: object_uid(o),
            name: o.name_any(),
            namespace: o.namespace().unwrap_or_default(),
            hard: status.and_then(|s| s.hard.as_ref()).map(to_map).unwrap_or_default(),
            used: status.and_then(|s| s.used.as_ref()).map(to_map).unwrap_or_default(),
        })
    });
    let key_of = Arc::new(|v: &ResourceQuota| crate::model::keys::namespaced_key(&v.namespace, &v.name));
    Arc::new(WatchCollector::new(
        "resourcequotas",
        api,
        translate,
        key_of,
        |s| &s.resource_quotas,
        store,
        metrics,
    ))
}

pub fn pdbs(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<policy::PodDisruptionBudget> = Api::all(client);
    let translate = Arc::new(|o: &policy::PodDisruptionBudget| -> Option<Pdb> {
        let spec = o.spec.as_ref()?;
        let status = o.status.as_ref();
        Some(Pdb {
            uid: object_uid(o),
            name: o.name_any(),
            namespace: o.namespace().unwrap_or_default(),
            match_labels: sel(spec.selector.as_ref().and_then(|s| s.match_labels.as_ref())),
            min_available: spec.min_available.as_ref().map(int_or_string),
            max_unavailable: spec.max_unavailable.as_ref().map(int_or_string),
            disruptions_allowed: status.map(|s| s.disruptions_allowed).unwrap_or(0),
            target_workloads: Vec::new(),
        })
    });
    let key_of = Arc::new(|v: &Pdb| crate::model::keys::namespaced_key(&v.namespace, &v.name));
    Arc::new(WatchCollector::new(
        "poddisruptionbudgets",
        api,
        translate,
        key_of,
        |s| &s.pdbs,
        store,
        metrics,
    ))
}

pub fn hpas(client: Client, store: Arc<Store>, metrics: Arc<Metrics>) -> Arc<dyn Collector> {
    let api: Api<autoscaling::HorizontalPodAutoscaler> = Api::all(client);
    let translate = Arc::new(|o: &autoscaling::HorizontalPodAutoscaler| -> Option<Hpa> {
        let spec = o.spec.as_ref()?;
        let status = o.status.as_ref();
        Some(Hpa {
            uid: object_uid(o),
            name: o.name_any(),
            namespace: o.namespace().unwrap_or_default(),
            target_kind: spec.scale_target_ref.kind.clone(),
            target_name: spec.scale_target_ref.name.clone(),
            min_replicas: spec.min_replicas,
            max_replicas: spec.max_replicas,
            current_replicas: status.map(|s| s.current_replicas).unwrap_or(0),
            desired_replicas: status.map(|s| s.desired_replicas).unwrap_or(0),
        })
    });
    let key_of = Arc::new(|v: &Hpa| crate::model::keys::namespaced_key(&v.namespace, &v.name));
    Arc::new(WatchCollector::new(
        "horizontalpodautoscalers",
        api,
        translate,
        key_of,
        |s| &s.hpas,
        store,
        metrics,
    ))
}

/// VPA (`verticalpodautoscalers.autoscaling.k8s.io`) has no native
/// k8s-openapi type, so it's polled as a `DynamicObject` rather than
/// watched — `discovery` only registers this collector once it has
/// confirmed the CRD is actually installed (spec §4.5 "Capability-gated
/// collectors").
pub fn vpas(
    api: Api<DynamicObject>,
    interval: std::time::Duration,
    store: Arc<Store>,
    metrics: Arc<Metrics>,
) -> Arc<dyn Collector> {
    let translate = Arc::new(|obj: &DynamicObject| -> Option<Vpa> {
        let name = obj.name_any();
        if name.is_empty() {
            return None;
        }
        let spec = obj.data.get("spec")?;
        let target_ref = spec.get("targetRef")?;
        Some(Vpa {
            uid: object_uid(obj),
            name,
            namespace: obj.namespace().unwrap_or_default(),
            target_kind: target_ref.get("kind").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            target_name: target_ref.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            update_mode: spec
                .get("updatePolicy")
                .and_then(|u| u.get("updateMode"))
                .and_then(|v| v.as_str())
                .unwrap_or("Auto")
                .to_string(),
        })
    });
    let key_of = Arc::new(|v: &Vpa| crate::model::keys::namespaced_key(&v.namespace, &v.name));
    Arc::new(DynamicPollCollector::new(
        "vpas",
        api,
        interval,
        translate,
        key_of,
        |s| &s.vpas,
        store,
        metrics,
    ))
}

/// A best-effort projection for a CRD-backed rollout controller (e.g.
/// Argo Rollouts) this agent has no native type for (spec §3
/// "CustomWorkload"). `kind`/`api_version` are fixed at construction since
/// one `DynamicPollCollector` instance watches exactly one GVK.
pub fn custom_workloads(
    api: Api<DynamicObject>,
    kind: String,
    api_version: String,
    interval: std::time::Duration,
    store: Arc<Store>,
    metrics: Arc<Metrics>,
) -> Arc<dyn Collector> {
    let translate = Arc::new(move |obj: &DynamicObject| -> Option<CustomWorkload> {
        let name = obj.name_any();
        if name.is_empty() {
            return None;
        }
        let selector = obj
            .data
            .get("spec")
            .and_then(|s| s.get("selector"))
            .and_then(|s| s.get("matchLabels"))
            .and_then(|v| v.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        Some(CustomWorkload {
            uid: object_uid(obj),
            name,
            namespace: obj.namespace().unwrap_or_default(),
            kind: kind.clone(),
            api_version: api_version.clone(),
            selector,
        })
    });
    let key_of = Arc::new(|v: &CustomWorkload| crate::model::keys::namespaced_key(&v.namespace, &v.name));
    Arc::new(DynamicPollCollector::new(
        "customworkloads",
        api,
        interval,
        translate,
        key_of,
        |s| &s.custom_workloads,
        store,
        metrics,
    ))
}
