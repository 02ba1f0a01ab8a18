use std::sync::Arc;

use chaosd_exec::NetworkNamespace;
use chaosd_tc::tc::operation::{QdiscRequest, Verb};
use chaosd_tc::{
    Direction, Error, Handle, Netem, Parent, Rule, RuleKind, Tbf, TcConfig, TrafficShaper,
};
use tokio_util::sync::CancellationToken;

use crate::helpers::{RecordingFilter, RecordingRunner};

fn delay(delay: u32) -> Rule {
    Rule::netem(Netem { delay, ..Default::default() })
}

fn shaper(runner: &Arc<RecordingRunner>, filter: &Arc<RecordingFilter>) -> TrafficShaper {
    TrafficShaper::new(runner.clone(), filter.clone())
}

/// Two global rules and two filtered ones, as documented on the `tc` module.
fn two_global_two_filtered() -> Vec<Rule> {
    vec![delay(50_000), delay(100_000), delay(50_000).with_ipset("A"), delay(100_000).with_ipset("B")]
}

#[tokio::test]
async fn two_global_two_filtered_rules() {
    let _ = tracing_subscriber::fmt::try_init();

    let runner = Arc::new(RecordingRunner::new());
    let filter = Arc::new(RecordingFilter::new());
    let namespace = NetworkNamespace::from_pid(1234);

    shaper(&runner, &filter)
        .set_traffic_rules(&CancellationToken::new(), &namespace, &two_global_two_filtered())
        .await
        .unwrap();

    assert_eq!(
        runner.lines(),
        vec![
            "qdisc del dev eth0 root",
            "qdisc add dev eth0 root handle 1: netem delay 50000",
            "qdisc add dev eth0 parent 1: handle 2: netem delay 100000",
            "qdisc add dev eth0 parent 2: handle 3: prio bands 5 priomap 1 2 2 2 1 2 0 0 1 1 1 1 1 1 1 1",
            "qdisc add dev eth0 parent 3:1 handle 4: sfq",
            "qdisc add dev eth0 parent 3:2 handle 5: sfq",
            "qdisc add dev eth0 parent 3:3 handle 6: sfq",
            "qdisc add dev eth0 parent 3:4 handle 7: netem delay 50000",
            "qdisc add dev eth0 parent 3:5 handle 8: netem delay 100000",
        ]
    );

    let calls = runner.calls();
    assert!(calls.iter().all(|call| call.program == "tc" && call.namespace == namespace));

    assert_eq!(filter.calls(), 1);
    let chains = filter.chains();
    assert_eq!(chains.len(), 2);

    assert_eq!(chains[0].name, "TC-TABLES-0");
    assert_eq!(chains[0].direction, Direction::Output);
    assert_eq!(chains[0].ipsets, vec!["A"]);
    assert_eq!(chains[0].target, Handle::class(3, 4));
    assert_eq!(chains[0].target_spec(), "CLASSIFY --set-class 3:4");

    assert_eq!(chains[1].name, "TC-TABLES-1");
    assert_eq!(chains[1].ipsets, vec!["B"]);
    assert_eq!(chains[1].target_spec(), "CLASSIFY --set-class 3:5");
}

#[tokio::test]
async fn empty_rule_set_installs_default_bands() {
    let runner = Arc::new(RecordingRunner::new());
    let filter = Arc::new(RecordingFilter::new());

    shaper(&runner, &filter)
        .set_traffic_rules(&CancellationToken::new(), &NetworkNamespace::host(), &[])
        .await
        .unwrap();

    assert_eq!(
        runner.lines(),
        vec![
            "qdisc del dev eth0 root",
            "qdisc add dev eth0 root handle 1: prio bands 3 priomap 1 2 2 2 1 2 0 0 1 1 1 1 1 1 1 1",
            "qdisc add dev eth0 parent 1:1 handle 2: sfq",
            "qdisc add dev eth0 parent 1:2 handle 3: sfq",
            "qdisc add dev eth0 parent 1:3 handle 4: sfq",
        ]
    );
    assert_eq!(filter.calls(), 1);
    assert!(filter.chains().is_empty());
}

#[tokio::test]
async fn filtered_only_with_bandwidth() {
    let runner = Arc::new(RecordingRunner::new());
    let filter = Arc::new(RecordingFilter::new());

    let rules = vec![
        Rule::bandwidth(Tbf { rate: 8_000_000, burst: 32_000, limit: 64_000, ..Default::default() })
            .with_ipset("db"),
        Rule::netem(Netem { loss: 5.0, loss_corr: 25.0, ..Default::default() }).with_ipset("db"),
    ];

    shaper(&runner, &filter)
        .set_traffic_rules(&CancellationToken::new(), &NetworkNamespace::host(), &rules)
        .await
        .unwrap();

    let lines = runner.lines();
    assert_eq!(lines[1], "qdisc add dev eth0 root handle 1: prio bands 4 priomap 1 2 2 2 1 2 0 0 1 1 1 1 1 1 1 1");
    assert_eq!(lines[5], "qdisc add dev eth0 parent 1:4 handle 5: tbf rate 8000000 burst 32000 limit 64000");
    assert_eq!(lines[6], "qdisc add dev eth0 parent 5: handle 6: netem loss 5.000000 25.000000");
    assert_eq!(lines.len(), 7);

    let chains = filter.chains();
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].ipsets, vec!["db"]);
    assert_eq!(chains[0].target_spec(), "CLASSIFY --set-class 1:4");
}

#[tokio::test]
async fn flush_without_root_qdisc_succeeds() {
    for message in
        ["Error: Cannot delete qdisc with handle of zero.\n", "RTNETLINK answers: No such file or directory\n"]
    {
        let runner = Arc::new(RecordingRunner::new().fail_at(0, message));
        let filter = Arc::new(RecordingFilter::new());

        shaper(&runner, &filter)
            .set_traffic_rules(&CancellationToken::new(), &NetworkNamespace::host(), &[delay(10_000)])
            .await
            .unwrap();

        assert_eq!(runner.calls().len(), 6);
        assert_eq!(filter.calls(), 1);
    }

    let runner = Arc::new(RecordingRunner::new().fail_at(0, "RTNETLINK answers: No such file or directory"));
    let filter = Arc::new(RecordingFilter::new());
    shaper(&runner, &filter).flush(&CancellationToken::new(), &NetworkNamespace::host()).await.unwrap();
    assert_eq!(runner.lines(), vec!["qdisc del dev eth0 root"]);
}

#[tokio::test]
async fn flush_failure_aborts() {
    let runner = Arc::new(RecordingRunner::new().fail_at(0, "Cannot find device \"eth0\"\n"));
    let filter = Arc::new(RecordingFilter::new());

    let err = shaper(&runner, &filter)
        .set_traffic_rules(&CancellationToken::new(), &NetworkNamespace::host(), &[delay(10_000)])
        .await
        .unwrap_err();

    match err {
        Error::CommandExecutionFailed { operation, output } => {
            assert_eq!(operation, "qdisc del dev eth0 root");
            assert_eq!(output.stderr, "Cannot find device \"eth0\"\n");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runner.calls().len(), 1);
    assert_eq!(filter.calls(), 0);
}

#[tokio::test]
async fn failure_on_third_operation_stops_compilation() {
    let runner = Arc::new(RecordingRunner::new().fail_at(2, "RTNETLINK answers: Invalid argument\n"));
    let filter = Arc::new(RecordingFilter::new());

    let err = shaper(&runner, &filter)
        .set_traffic_rules(&CancellationToken::new(), &NetworkNamespace::host(), &two_global_two_filtered())
        .await
        .unwrap_err();

    match err {
        Error::CommandExecutionFailed { operation, output } => {
            assert_eq!(operation, "qdisc add dev eth0 parent 1: handle 2: netem delay 100000");
            assert_eq!(output.status, Some(2));
            assert_eq!(output.stderr, "RTNETLINK answers: Invalid argument\n");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(runner.calls().len(), 3);
    assert_eq!(filter.calls(), 0);
}

#[tokio::test]
async fn invalid_rules_leave_namespace_untouched() {
    let runner = Arc::new(RecordingRunner::new());
    let filter = Arc::new(RecordingFilter::new());

    let rules = vec![delay(10_000), Rule::bandwidth(Tbf { burst: 1600, ..Default::default() })];
    let err = shaper(&runner, &filter)
        .set_traffic_rules(&CancellationToken::new(), &NetworkNamespace::host(), &rules)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRuleSpec(_)), "{err}");

    let rules = vec![Rule { kind: RuleKind::Unknown, netem: None, tbf: None, ipset: Some("A".into()) }];
    let err = shaper(&runner, &filter)
        .set_traffic_rules(&CancellationToken::new(), &NetworkNamespace::host(), &rules)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedRuleKind(_)), "{err}");

    assert!(runner.calls().is_empty());
    assert_eq!(filter.calls(), 0);
}

#[tokio::test]
async fn cancellation_stops_remaining_operations() {
    let runner = Arc::new(RecordingRunner::new().cancel_at(1));
    let filter = Arc::new(RecordingFilter::new());
    let cancel = CancellationToken::new();

    let err = shaper(&runner, &filter)
        .set_traffic_rules(&cancel, &NetworkNamespace::host(), &two_global_two_filtered())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled), "{err}");
    assert!(cancel.is_cancelled());
    assert_eq!(runner.calls().len(), 2);
    assert_eq!(filter.calls(), 0);
}

#[tokio::test]
async fn cancellation_after_last_qdisc_skips_classification() {
    let runner = Arc::new(RecordingRunner::new().cancel_at(8));
    let filter = Arc::new(RecordingFilter::new());
    let cancel = CancellationToken::new();

    let err = shaper(&runner, &filter)
        .set_traffic_rules(&cancel, &NetworkNamespace::host(), &two_global_two_filtered())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled), "{err}");
    assert_eq!(runner.calls().len(), 9);
    assert_eq!(filter.calls(), 0);
}

#[tokio::test]
async fn cancelled_before_start() {
    let runner = Arc::new(RecordingRunner::new());
    let filter = Arc::new(RecordingFilter::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = shaper(&runner, &filter)
        .set_traffic_rules(&cancel, &NetworkNamespace::host(), &[delay(1)])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn classification_failure_is_reported() {
    let runner = Arc::new(RecordingRunner::new());
    let filter = Arc::new(RecordingFilter::failing());

    let err = shaper(&runner, &filter)
        .set_traffic_rules(&CancellationToken::new(), &NetworkNamespace::host(), &two_global_two_filtered())
        .await
        .unwrap_err();

    match err {
        Error::ClassificationApplyFailed(source) => {
            assert_eq!(source.to_string(), "iptables: No chain/target/match by that name.");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runner.calls().len(), 9);
    assert_eq!(filter.calls(), 1);
}

#[tokio::test]
async fn custom_config() {
    let runner = Arc::new(RecordingRunner::new());
    let filter = Arc::new(RecordingFilter::new());
    let config = TcConfig::default().with_device("veth0").with_tc_program("/sbin/tc").with_chain_prefix("CHAOS");

    shaper(&runner, &filter)
        .with_config(config)
        .set_traffic_rules(&CancellationToken::new(), &NetworkNamespace::host(), &[delay(1).with_ipset("A")])
        .await
        .unwrap();

    let calls = runner.calls();
    assert!(calls.iter().all(|call| call.program == "/sbin/tc"));
    assert_eq!(calls[0].line(), "qdisc del dev veth0 root");
    assert_eq!(filter.chains()[0].name, "CHAOS-0");
}

#[tokio::test]
async fn namespaces_are_shaped_independently() {
    let runner = Arc::new(RecordingRunner::new());
    let filter = Arc::new(RecordingFilter::new());
    let shaper = shaper(&runner, &filter);
    let cancel = CancellationToken::new();

    let first = NetworkNamespace::from_pid(100);
    let second = NetworkNamespace::from_pid(200);
    let first_rules = two_global_two_filtered();
    let second_rules = vec![delay(1_000)];

    let (a, b) = tokio::join!(
        shaper.set_traffic_rules(&cancel, &first, &first_rules),
        shaper.set_traffic_rules(&cancel, &second, &second_rules),
    );
    a.unwrap();
    b.unwrap();

    let lines_for = |namespace: &NetworkNamespace| -> Vec<String> {
        runner.calls().iter().filter(|call| &call.namespace == namespace).map(|call| call.line()).collect()
    };

    assert_eq!(lines_for(&first).len(), 9);
    assert_eq!(
        lines_for(&second),
        vec![
            "qdisc del dev eth0 root",
            "qdisc add dev eth0 root handle 1: netem delay 1000",
            "qdisc add dev eth0 parent 1: handle 2: prio bands 3 priomap 1 2 2 2 1 2 0 0 1 1 1 1 1 1 1 1",
            "qdisc add dev eth0 parent 2:1 handle 3: sfq",
            "qdisc add dev eth0 parent 2:2 handle 4: sfq",
            "qdisc add dev eth0 parent 2:3 handle 5: sfq",
        ]
    );
    assert_eq!(filter.calls(), 2);
}

#[tokio::test]
async fn json_rule_set() {
    let runner = Arc::new(RecordingRunner::new());
    let filter = Arc::new(RecordingFilter::new());

    let rules: Vec<Rule> = serde_json::from_str(
        r#"[
            {"type": "netem", "netem": {"delay": 50000, "jitter": 10000, "delay_corr": 25}},
            {"type": "netem", "netem": {"loss": 10}, "ipset": "chaos-targets"}
        ]"#,
    )
    .unwrap();

    shaper(&runner, &filter)
        .set_traffic_rules(&CancellationToken::new(), &NetworkNamespace::named("chaos"), &rules)
        .await
        .unwrap();

    let lines = runner.lines();
    assert_eq!(lines[1], "qdisc add dev eth0 root handle 1: netem delay 50000 10000 25.000000");
    assert_eq!(lines[6], "qdisc add dev eth0 parent 2:4 handle 6: netem loss 10.000000");
    assert_eq!(filter.chains()[0].ipsets, vec!["chaos-targets"]);
}

#[tokio::test]
async fn single_qdisc_through_client() {
    let runner = Arc::new(RecordingRunner::new());
    let filter = Arc::new(RecordingFilter::new());
    let shaper = shaper(&runner, &filter);
    let namespace = NetworkNamespace::host();
    let cancel = CancellationToken::new();

    let client = shaper.client(&namespace, &cancel);
    client.add_qdisc(Handle::class(1, 4).into(), Handle::qdisc(5), &delay(20_000)).await.unwrap();

    let err = client
        .add_qdisc(Parent::Root, Handle::qdisc(1), &Rule::bandwidth(Tbf::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRuleSpec(_)), "{err}");

    assert_eq!(runner.lines(), vec!["qdisc add dev eth0 parent 1:4 handle 5: netem delay 20000"]);
}

#[tokio::test]
async fn qdisc_requests_through_client() {
    let runner = Arc::new(RecordingRunner::new());
    let filter = Arc::new(RecordingFilter::new());
    let shaper = shaper(&runner, &filter);
    let namespace = NetworkNamespace::named("chaos");
    let cancel = CancellationToken::new();
    let client = shaper.client(&namespace, &cancel);

    let request: QdiscRequest = serde_json::from_str(
        r#"{"parent": {"major": 1, "minor": 0}, "kind": "netem", "args": ["loss", "10"]}"#,
    )
    .unwrap();
    client.apply_request(Verb::Add, &request).await.unwrap();

    let request = QdiscRequest {
        parent: Some(Handle::class(1, 2)),
        handle: Some(Handle::qdisc(5)),
        kind: "sfq".to_string(),
        args: Vec::new(),
    };
    client.apply_request(Verb::Del, &request).await.unwrap();

    let err = client.apply_request(Verb::Add, &QdiscRequest::default()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidRuleSpec(_)), "{err}");

    assert_eq!(
        runner.lines(),
        vec![
            "qdisc add dev eth0 root handle 1: netem loss 10",
            "qdisc del dev eth0 parent 1:2 handle 5: sfq",
        ]
    );
}
