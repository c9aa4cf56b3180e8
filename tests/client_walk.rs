//! WALK and BULK-WALK against the UDP test agent.

mod common;

use common::{TestAgent, combined, device, device_with, interface_table, system_mib};
use snmp_monitor::client::oids;
use snmp_monitor::device::SnmpCredentials;
use snmp_monitor::{ClientConfig, Error, SnmpClient, Version, WalkAbortReason, oid};

fn if_descr() -> snmp_monitor::Oid {
    oids::if_entry().child(2)
}

#[tokio::test]
async fn walk_of_five_rows_returns_five_varbinds() {
    let agent = TestAgent::new(combined([system_mib(), interface_table(5)])).await;
    let client = SnmpClient::new(ClientConfig::default());

    let varbinds = client.walk(&device(&agent), &if_descr(), None).await.unwrap();
    assert_eq!(varbinds.len(), 5);
    assert!(varbinds.iter().all(|vb| vb.oid.starts_with(&if_descr())));
    assert_eq!(varbinds[4].value.as_str(), Some("eth5"));
    assert_eq!(agent.requests(), 1);
}

#[tokio::test]
async fn small_max_repetitions_takes_more_round_trips() {
    let agent = TestAgent::new(combined([system_mib(), interface_table(5)])).await;
    let client = SnmpClient::new(ClientConfig::default());

    let varbinds = client.walk(&device(&agent), &if_descr(), Some(2)).await.unwrap();
    assert_eq!(varbinds.len(), 5);
    assert_eq!(agent.requests(), 3);
}

#[tokio::test]
async fn v1_walk_uses_getnext() {
    let agent = TestAgent::new(combined([system_mib(), interface_table(4)])).await;
    let client = SnmpClient::new(ClientConfig::default());

    let varbinds = client
        .walk(&device_with(&agent, SnmpCredentials::v1("public")), &if_descr(), None)
        .await
        .unwrap();
    assert_eq!(varbinds.len(), 4);
    // One GETNEXT per row plus the one that leaves the column.
    assert_eq!(agent.requests(), 5);
}

#[tokio::test]
async fn walk_to_end_of_mib() {
    let agent = TestAgent::new(system_mib()).await;
    let client = SnmpClient::new(ClientConfig::default());

    let varbinds = client.walk(&device(&agent), &oids::system(), None).await.unwrap();
    assert_eq!(varbinds.len(), 6);
}

#[tokio::test]
async fn bulk_walk_rejects_v1_without_network() {
    let agent = TestAgent::new(system_mib()).await;
    let client = SnmpClient::new(ClientConfig::default());

    let err = client
        .bulk_walk(&device_with(&agent, SnmpCredentials::v1("public")), &oids::system(), 0, 10)
        .await
        .unwrap_err();
    assert!(matches!(*err, Error::Capability { version: Version::V1, .. }));
    assert_eq!(agent.requests(), 0);
}

#[tokio::test]
async fn bulk_walk_validates_parameters() {
    let agent = TestAgent::new(system_mib()).await;
    let client = SnmpClient::new(ClientConfig::default());

    let err = client.bulk_walk(&device(&agent), &oids::system(), -1, 101).await.unwrap_err();
    match &*err {
        Error::Validation { errors } => assert_eq!(errors.len(), 2),
        other => panic!("expected validation error, got {other}"),
    }
    assert_eq!(agent.requests(), 0);
}

#[tokio::test]
async fn bulk_walk_collects_subtree() {
    let agent = TestAgent::new(combined([system_mib(), interface_table(3)])).await;
    let client = SnmpClient::new(ClientConfig::default());

    let varbinds = client.bulk_walk(&device(&agent), &oids::if_entry(), 0, 50).await.unwrap();
    // Ten ifEntry columns for each of three interfaces.
    assert_eq!(varbinds.len(), 30);
    assert!(varbinds.windows(2).all(|pair| pair[0].oid < pair[1].oid));
}

#[tokio::test]
async fn ceiling_is_reported() {
    let agent = TestAgent::new(combined([system_mib(), interface_table(20)])).await;
    let config = ClientConfig {
        walk_ceiling: 15,
        ..ClientConfig::default()
    };
    let client = SnmpClient::new(config);

    let err = client.walk(&device(&agent), &if_descr(), None).await.unwrap_err();
    assert!(matches!(
        *err,
        Error::WalkAborted {
            reason: WalkAbortReason::IterationCeiling { limit: 15 },
            ..
        }
    ));
}

#[tokio::test]
async fn empty_subtree_walk() {
    let agent = TestAgent::new(system_mib()).await;
    let client = SnmpClient::new(ClientConfig::default());

    let varbinds = client.walk(&device(&agent), &oid!(1, 3, 6, 1, 2, 1, 4), None).await.unwrap();
    assert!(varbinds.is_empty());
}
