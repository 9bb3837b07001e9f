//! Loopback TLS over TCP using configurations derived from a keystore

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use keystash::{Keystash, KeystoreConfig};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};

const FAST_KDF: NonZeroU32 = match NonZeroU32::new(1_000) {
    Some(n) => n,
    None => unreachable!(),
};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../core/tests/fixtures")
        .join(name)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn mutual_tls_echo_over_loopback() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let mut builder =
        Keystash::from_config(KeystoreConfig::new(dir.path().join("keystore.ks")).with_kdf_iterations(FAST_KDF));
    builder
        .add_certificate("kermit", fixture("kermit.crt"))
        .add_private_key("kermit", fixture("kermit.key"));
    let tls = builder.build().unwrap().context;

    let acceptor = TlsAcceptor::from(tls.server_config_with_client_auth().unwrap());
    let connector = TlsConnector::from(tls.client_config().unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut tls = acceptor.accept(stream).await.unwrap();
        let client_presented = tls.get_ref().1.peer_certificates().is_some_and(|c| !c.is_empty());

        let mut buf = [0u8; 5];
        tls.read_exact(&mut buf).await.unwrap();
        tls.write_all(&buf).await.unwrap();
        tls.shutdown().await.unwrap();
        client_presented
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let domain = ServerName::try_from("localhost").unwrap();
    let mut tls = connector.connect(domain, stream).await.unwrap();

    tls.write_all(b"hello").await.unwrap();
    let mut echoed = Vec::new();
    tls.read_to_end(&mut echoed).await.unwrap();

    assert_eq!(echoed, b"hello");
    assert!(server.await.unwrap());
}

#[tokio::test]
async fn untrusted_server_fails_handshake() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let mut server_builder =
        Keystash::from_config(KeystoreConfig::new(dir.path().join("server.ks")).with_kdf_iterations(FAST_KDF));
    server_builder.add_pem("piggy", fixture("piggy.pem"));
    let server_tls = server_builder.build().unwrap().context;

    let mut client_builder =
        Keystash::from_config(KeystoreConfig::new(dir.path().join("client.ks")).with_kdf_iterations(FAST_KDF));
    client_builder.add_certificate("kermit", fixture("kermit.crt"));
    let client_tls = client_builder.build().unwrap().context;

    let acceptor = TlsAcceptor::from(server_tls.server_config().unwrap());
    let connector = TlsConnector::from(client_tls.client_config().unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        acceptor.accept(stream).await.is_err()
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let domain = ServerName::try_from("localhost").unwrap();
    assert!(connector.connect(domain, stream).await.is_err());
    assert!(server.await.unwrap());
}
