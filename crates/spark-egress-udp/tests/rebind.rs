//! 迁移重绑定测试：专用路径独立绑定、连接到新对端、可被替换与释放。

mod support;

use std::io;
use std::sync::Arc;

use spark_egress::{
    ConnectionId, MigrationListener, MigrationRegistry, NoopMetrics, PerPacketOptions, WriteError,
    WriteResult,
};
use spark_egress_udp::{EgressPath, EgressRebinder, UdpEgressConfig};
use support::{init_tracing, loopback, receiver, recv_one};

fn loopback_config() -> UdpEgressConfig {
    UdpEgressConfig::default().with_bind_addr("127.0.0.1:0".parse().expect("bind addr"))
}

fn rebinder(config: UdpEgressConfig) -> (Arc<EgressRebinder>, Arc<dyn MigrationListener>) {
    let rebinder = Arc::new(EgressRebinder::new(config, Arc::new(NoopMetrics)).expect("rebinder"));
    let listener: Arc<dyn MigrationListener> = rebinder.clone();
    (rebinder, listener)
}

#[tokio::test(flavor = "multi_thread")]
async fn migration_opens_dedicated_path_to_new_peer() {
    init_tracing();
    let config = loopback_config();
    let primary = EgressPath::bind(&config, Arc::new(NoopMetrics)).expect("primary path");
    let registry = MigrationRegistry::new();
    let (rebinder, listener) = rebinder(config);
    let conn = ConnectionId::new(0x51);
    registry.subscribe(conn, &listener);
    let (socket, new_peer) = receiver().await;

    assert_eq!(registry.notify_migration(conn, new_peer), 1);

    let shared = rebinder.path(conn).expect("dedicated path");
    let mut path = shared.lock().await;
    let local = path.local_addr().expect("dedicated local addr");
    assert_ne!(local, primary.local_addr().expect("primary local addr"));
    assert_eq!(
        path.writer().sink().connected_peer(),
        Some(new_peer.socket_addr())
    );
    assert!(!path.writer().is_write_blocked());
    assert!(!primary.writer().is_write_blocked());

    let result = path
        .writer_mut()
        .write_packet(b"migrated", loopback(), new_peer, PerPacketOptions::default());
    assert_eq!(result, WriteResult::Ok(8));
    let (payload, from) = recv_one(&socket).await.expect("datagram delivered");
    assert_eq!(payload, b"migrated");
    assert_eq!(from, local);
}

#[tokio::test(flavor = "multi_thread")]
async fn second_migration_replaces_path() {
    let registry = MigrationRegistry::new();
    let (rebinder, listener) = rebinder(loopback_config());
    let conn = ConnectionId::new(7);
    registry.subscribe(conn, &listener);
    let (_first_socket, first_peer) = receiver().await;
    let (second_socket, second_peer) = receiver().await;

    registry.notify_migration(conn, first_peer);
    let first = rebinder.path(conn).expect("first path");
    registry.notify_migration(conn, second_peer);
    let second = rebinder.path(conn).expect("second path");

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(rebinder.len(), 1);

    let mut path = second.lock().await;
    path.writer_mut()
        .write_packet(b"again", loopback(), second_peer, PerPacketOptions::default());
    let (payload, _) = recv_one(&second_socket).await.expect("datagram delivered");
    assert_eq!(payload, b"again");
}

#[tokio::test(flavor = "multi_thread")]
async fn close_connection_releases_path() {
    let (rebinder, _listener) = rebinder(loopback_config());
    let conn = ConnectionId::new(9);
    let (_socket, new_peer) = receiver().await;
    let shared = rebinder.rebind(conn, new_peer).expect("rebind");

    assert!(rebinder.close_connection(conn));
    assert!(!rebinder.close_connection(conn));
    assert!(rebinder.path(conn).is_none());
    assert!(rebinder.is_empty());
    assert!(shared.lock().await.writer().is_closed());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_rebind_leaves_no_path() {
    // 192.0.2.0/24 为文档保留网段，本机无法绑定。
    let config = UdpEgressConfig::default().with_bind_addr("192.0.2.1:0".parse().expect("addr"));
    let registry = MigrationRegistry::new();
    let (rebinder, listener) = rebinder(config);
    let conn = ConnectionId::new(3);
    registry.subscribe(conn, &listener);
    let (_socket, new_peer) = receiver().await;

    assert_eq!(registry.notify_migration(conn, new_peer), 1);
    assert!(rebinder.path(conn).is_none());
    assert_eq!(
        rebinder
            .rebind(conn, new_peer)
            .expect_err("unbindable address")
            .code(),
        "spark.egress.udp.bind_failed"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn dedicated_path_rejects_other_destinations() {
    let (rebinder, _listener) = rebinder(loopback_config());
    let (_socket, new_peer) = receiver().await;
    let (_stray_socket, stray_peer) = receiver().await;
    let shared = rebinder
        .rebind(ConnectionId::new(11), new_peer)
        .expect("rebind");
    let mut path = shared.lock().await;

    let result = path
        .writer_mut()
        .write_packet(b"stray", loopback(), stray_peer, PerPacketOptions::default());

    assert_eq!(
        result,
        WriteResult::Error(WriteError::Io {
            kind: io::ErrorKind::InvalidInput,
            os_code: None,
        })
    );
    assert!(!path.writer().is_write_blocked());
}
