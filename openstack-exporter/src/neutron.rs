//! Network service (Neutron) exporter.

use std::sync::Arc;

use async_trait::async_trait;
use openstack_exporter_common::{Descriptor, MetricKind, MetricSink, Sample};
use tracing::{error, info};

use crate::auth::{AuthError, AuthenticatingClient};
use crate::config::{CloudConfig, ConfigError};
use crate::exporter::{BaseExporter, Exporter, ScrapeStatus};
use crate::network::{NetworkApi, NetworkError};

/// Subsystem name used in metric names.
pub const NEUTRON: &str = "neutron";

struct MetricDef {
    name: &'static str,
    labels: &'static [&'static str],
    kind: MetricKind,
    help: &'static str,
}

const NEUTRON_METRICS: &[MetricDef] = &[
    MetricDef {
        name: "floating_ips",
        labels: &[],
        kind: MetricKind::Gauge,
        help: "Number of floating IPs",
    },
    MetricDef {
        name: "networks",
        labels: &[],
        kind: MetricKind::Gauge,
        help: "Number of networks",
    },
    MetricDef {
        name: "security_groups",
        labels: &[],
        kind: MetricKind::Gauge,
        help: "Number of security groups",
    },
    MetricDef {
        name: "subnets",
        labels: &[],
        kind: MetricKind::Gauge,
        help: "Number of subnets",
    },
    MetricDef {
        name: "agent_state",
        labels: &["hostname", "service", "adminState"],
        kind: MetricKind::Counter,
        help: "Network agent liveness (1 alive, 0 dead)",
    },
];

/// Exports floating IP, network, security group and subnet counts plus
/// per-agent state from the network service.
pub struct NetworkExporter<A: AuthenticatingClient> {
    base: BaseExporter,
    auth: A,
    client: Option<A::Network>,
}

impl<A: AuthenticatingClient> NetworkExporter<A> {
    /// Create the exporter and register its metrics. Performs no I/O.
    pub fn new(auth: A, prefix: &str, config: &CloudConfig) -> Result<Self, ConfigError> {
        let mut base = BaseExporter::new(NEUTRON, prefix, config.name.as_str());

        for metric in NEUTRON_METRICS {
            base.add_metric(metric.name, metric.labels, metric.kind, Some(metric.help))?;
        }

        Ok(Self {
            base,
            auth,
            client: None,
        })
    }

    pub fn base(&self) -> &BaseExporter {
        &self.base
    }

    /// Re-authenticate and rebuild the network client from the new session.
    pub async fn refresh_session(&mut self) -> Result<(), AuthError> {
        info!(cloud = %self.base.cloud(), "Refreshing auth client in case token has expired");

        self.client = None;
        self.auth.authenticate().await?;
        self.client = Some(self.auth.network_client()?);
        Ok(())
    }

    fn emit_count(&self, sink: &mut (dyn MetricSink<Sample> + Send), metric: &str, count: usize) {
        self.base.emit(sink, metric, count as f64, Vec::new());
    }
}

/// Unwrap a list result, logging the failure and treating it as empty.
fn or_empty<T>(what: &str, result: Result<Vec<T>, NetworkError>) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(e) => {
            error!(query = what, error = %e, "Failed to list {}", what);
            Vec::new()
        }
    }
}

#[async_trait]
impl<A: AuthenticatingClient> Exporter for NetworkExporter<A> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn describe(&self, sink: &mut dyn MetricSink<Arc<Descriptor>>) {
        self.base.describe(sink);
    }

    async fn collect(&mut self, sink: &mut (dyn MetricSink<Sample> + Send)) -> ScrapeStatus {
        if let Err(e) = self.refresh_session().await {
            error!(cloud = %self.base.cloud(), error = %e, "Error authenticating neutron client");
            return ScrapeStatus::Aborted;
        }

        let Some(client) = self.client.as_ref() else {
            return ScrapeStatus::Aborted;
        };

        info!("Fetching floating ips list");
        let floating_ips = or_empty("floating ips", client.list_floating_ips().await);

        info!("Fetching agents list");
        let agents = or_empty("agents", client.list_agents().await);

        for agent in &agents {
            let state = if agent.alive { 1.0 } else { 0.0 };
            let admin_state = if agent.admin_state_up { "up" } else { "down" };

            self.base.emit(
                sink,
                "agent_state",
                state,
                vec![
                    agent.host.clone(),
                    agent.binary.clone(),
                    admin_state.to_string(),
                ],
            );
        }

        info!("Fetching list of networks");
        let networks = or_empty("networks", client.list_networks().await);

        info!("Fetching list of security groups");
        let security_groups = or_empty("security groups", client.list_security_groups().await);

        info!("Fetching list of subnets");
        let subnets = or_empty("subnets", client.list_subnets().await);

        self.emit_count(sink, "subnets", subnets.len());
        self.emit_count(sink, "floating_ips", floating_ips.len());
        self.emit_count(sink, "networks", networks.len());
        self.emit_count(sink, "security_groups", security_groups.len());

        ScrapeStatus::Collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Agent, FloatingIp, Network, SecurityGroup, Subnet};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Canned responses; `None` makes the corresponding call fail.
    #[derive(Clone, Default)]
    struct Responses {
        floating_ips: Option<usize>,
        agents: Option<Vec<Agent>>,
        networks: Option<usize>,
        security_groups: Option<usize>,
        subnets: Option<usize>,
    }

    #[derive(Default)]
    struct Calls {
        authenticate: AtomicUsize,
        network: AtomicUsize,
        queries: Mutex<Vec<&'static str>>,
    }

    struct MockCloud {
        fail_auth: bool,
        responses: Responses,
        calls: Arc<Calls>,
    }

    struct MockNetwork {
        responses: Responses,
        calls: Arc<Calls>,
    }

    fn failure(what: &str) -> NetworkError {
        NetworkError::Status {
            url: format!("http://neutron/v2.0/{}", what),
            status: 503,
        }
    }

    fn items<T>(count: Option<usize>, what: &str, make: fn(usize) -> T) -> Result<Vec<T>, NetworkError> {
        count
            .map(|n| (0..n).map(make).collect())
            .ok_or_else(|| failure(what))
    }

    #[async_trait]
    impl NetworkApi for MockNetwork {
        async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>, NetworkError> {
            self.calls.queries.lock().push("floatingips");
            items(self.responses.floating_ips, "floatingips", |i| FloatingIp {
                id: format!("fip-{}", i),
            })
        }

        async fn list_agents(&self) -> Result<Vec<Agent>, NetworkError> {
            self.calls.queries.lock().push("agents");
            self.responses.agents.clone().ok_or_else(|| failure("agents"))
        }

        async fn list_networks(&self) -> Result<Vec<Network>, NetworkError> {
            self.calls.queries.lock().push("networks");
            items(self.responses.networks, "networks", |i| Network {
                id: format!("net-{}", i),
            })
        }

        async fn list_security_groups(&self) -> Result<Vec<SecurityGroup>, NetworkError> {
            self.calls.queries.lock().push("security-groups");
            items(self.responses.security_groups, "security-groups", |i| {
                SecurityGroup {
                    id: format!("sg-{}", i),
                }
            })
        }

        async fn list_subnets(&self) -> Result<Vec<Subnet>, NetworkError> {
            self.calls.queries.lock().push("subnets");
            items(self.responses.subnets, "subnets", |i| Subnet {
                id: format!("subnet-{}", i),
            })
        }
    }

    #[async_trait]
    impl AuthenticatingClient for MockCloud {
        type Network = MockNetwork;

        async fn authenticate(&mut self) -> Result<(), AuthError> {
            self.calls.authenticate.fetch_add(1, Ordering::SeqCst);
            if self.fail_auth {
                return Err(AuthError::Rejected {
                    status: 401,
                    body: "The request you have made requires authentication.".into(),
                });
            }
            Ok(())
        }

        fn network_client(&self) -> Result<MockNetwork, AuthError> {
            self.calls.network.fetch_add(1, Ordering::SeqCst);
            Ok(MockNetwork {
                responses: self.responses.clone(),
                calls: Arc::clone(&self.calls),
            })
        }
    }

    fn agent(host: &str, binary: &str, alive: bool, admin_state_up: bool) -> Agent {
        Agent {
            host: host.into(),
            binary: binary.into(),
            alive,
            admin_state_up,
        }
    }

    fn two_agents() -> Vec<Agent> {
        vec![
            agent("h1", "b1", true, true),
            agent("h2", "b2", false, false),
        ]
    }

    fn exporter(fail_auth: bool, responses: Responses) -> (NetworkExporter<MockCloud>, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let cloud = MockCloud {
            fail_auth,
            responses,
            calls: Arc::clone(&calls),
        };
        let exporter = NetworkExporter::new(cloud, "openstack", &CloudConfig::default()).unwrap();
        (exporter, calls)
    }

    fn all_ok() -> Responses {
        Responses {
            floating_ips: Some(3),
            agents: Some(two_agents()),
            networks: Some(0),
            security_groups: Some(5),
            subnets: Some(2),
        }
    }

    /// Render samples as `name{values} value` for compact assertions.
    fn lines(samples: &[Sample]) -> Vec<String> {
        samples
            .iter()
            .map(|s| {
                if s.label_values.is_empty() {
                    format!("{} {}", s.descriptor.name, s.value)
                } else {
                    format!(
                        "{}{{{}}} {}",
                        s.descriptor.name,
                        s.label_values.join(","),
                        s.value
                    )
                }
            })
            .collect()
    }

    async fn scrape(exporter: &mut NetworkExporter<MockCloud>) -> (ScrapeStatus, Vec<Sample>) {
        let mut sink: Vec<Sample> = Vec::new();
        let status = exporter.collect(&mut sink).await;
        (status, sink)
    }

    #[test]
    fn test_describe_emits_five_descriptors() {
        let (exporter, calls) = exporter(true, Responses::default());

        let mut sink: Vec<Arc<Descriptor>> = Vec::new();
        exporter.describe(&mut sink);

        let described: Vec<_> = sink
            .iter()
            .map(|d| (d.fq_name.as_str(), d.labels.clone()))
            .collect();
        assert_eq!(
            described,
            vec![
                ("openstack_neutron_floating_ips", vec![]),
                ("openstack_neutron_networks", vec![]),
                ("openstack_neutron_security_groups", vec![]),
                ("openstack_neutron_subnets", vec![]),
                (
                    "openstack_neutron_agent_state",
                    vec![
                        "hostname".to_string(),
                        "service".to_string(),
                        "adminState".to_string()
                    ]
                ),
            ]
        );
        assert_eq!(calls.authenticate.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_describe_kinds() {
        let (exporter, _) = exporter(false, all_ok());
        let base = exporter.base();

        assert_eq!(base.descriptor("agent_state").unwrap().kind, MetricKind::Counter);
        for name in ["floating_ips", "networks", "security_groups", "subnets"] {
            assert_eq!(base.descriptor(name).unwrap().kind, MetricKind::Gauge);
        }
    }

    #[test]
    fn test_new_with_empty_prefix() {
        let calls = Arc::new(Calls::default());
        let cloud = MockCloud {
            fail_auth: false,
            responses: Responses::default(),
            calls,
        };
        let exporter = NetworkExporter::new(cloud, "", &CloudConfig::default()).unwrap();
        assert_eq!(
            exporter.base().descriptor("subnets").unwrap().fq_name,
            "neutron_subnets"
        );
    }

    #[tokio::test]
    async fn test_auth_failure_emits_nothing() {
        let (mut exporter, calls) = exporter(true, all_ok());

        let (status, samples) = scrape(&mut exporter).await;

        assert_eq!(status, ScrapeStatus::Aborted);
        assert!(samples.is_empty());
        assert_eq!(calls.authenticate.load(Ordering::SeqCst), 1);
        assert_eq!(calls.network.load(Ordering::SeqCst), 0);
        assert!(calls.queries.lock().is_empty());
    }

    #[tokio::test]
    async fn test_agent_state_samples() {
        let (mut exporter, _) = exporter(false, all_ok());

        let (status, samples) = scrape(&mut exporter).await;

        assert_eq!(status, ScrapeStatus::Collected);
        let lines = lines(&samples);
        assert_eq!(lines[0], "agent_state{h1,b1,up} 1");
        assert_eq!(lines[1], "agent_state{h2,b2,down} 0");
        assert_eq!(samples[0].kind(), MetricKind::Counter);
    }

    #[tokio::test]
    async fn test_incomplete_agent_still_reported() {
        let responses = Responses {
            agents: Some(vec![
                agent("h1", "b1", true, true),
                Agent {
                    binary: "b2".into(),
                    ..Agent::default()
                },
            ]),
            ..all_ok()
        };
        let (mut exporter, _) = exporter(false, responses);

        let (_, samples) = scrape(&mut exporter).await;

        let lines = lines(&samples);
        assert_eq!(lines[0], "agent_state{h1,b1,up} 1");
        assert_eq!(lines[1], "agent_state{,b2,down} 0");
        assert_eq!(lines.len(), 6);
    }

    #[tokio::test]
    async fn test_counts_and_order() {
        let (mut exporter, calls) = exporter(false, all_ok());

        let (_, samples) = scrape(&mut exporter).await;

        assert_eq!(
            lines(&samples),
            vec![
                "agent_state{h1,b1,up} 1",
                "agent_state{h2,b2,down} 0",
                "subnets 2",
                "floating_ips 3",
                "networks 0",
                "security_groups 5",
            ]
        );
        assert_eq!(
            *calls.queries.lock(),
            vec!["floatingips", "agents", "networks", "security-groups", "subnets"]
        );
    }

    #[tokio::test]
    async fn test_network_failure_is_partial() {
        let responses = Responses {
            networks: None,
            ..all_ok()
        };
        let (mut exporter, calls) = exporter(false, responses);

        let (status, samples) = scrape(&mut exporter).await;

        assert_eq!(status, ScrapeStatus::Collected);
        assert_eq!(
            lines(&samples),
            vec![
                "agent_state{h1,b1,up} 1",
                "agent_state{h2,b2,down} 0",
                "subnets 2",
                "floating_ips 3",
                "networks 0",
                "security_groups 5",
            ]
        );
        assert_eq!(calls.queries.lock().len(), 5);
    }

    #[tokio::test]
    async fn test_agent_failure_emits_no_agent_samples() {
        let responses = Responses {
            agents: None,
            ..all_ok()
        };
        let (mut exporter, _) = exporter(false, responses);

        let (_, samples) = scrape(&mut exporter).await;

        assert_eq!(
            lines(&samples),
            vec![
                "subnets 2",
                "floating_ips 3",
                "networks 0",
                "security_groups 5",
            ]
        );
    }

    #[tokio::test]
    async fn test_all_queries_fail() {
        let (mut exporter, _) = exporter(false, Responses::default());

        let (status, samples) = scrape(&mut exporter).await;

        assert_eq!(status, ScrapeStatus::Collected);
        assert_eq!(
            lines(&samples),
            vec!["subnets 0", "floating_ips 0", "networks 0", "security_groups 0"]
        );
    }

    #[tokio::test]
    async fn test_collect_is_idempotent() {
        let (mut exporter, calls) = exporter(false, all_ok());

        let (_, first) = scrape(&mut exporter).await;
        let (_, second) = scrape(&mut exporter).await;

        assert_eq!(first, second);
        assert_eq!(calls.authenticate.load(Ordering::SeqCst), 2);
        assert_eq!(calls.network.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refresh_session_clears_client_on_failure() {
        let (mut exporter, _) = exporter(false, all_ok());
        exporter.refresh_session().await.unwrap();
        assert!(exporter.client.is_some());

        exporter.auth.fail_auth = true;
        assert!(exporter.refresh_session().await.is_err());
        assert!(exporter.client.is_none());
    }
}
