//! Shared fixtures and an in-memory handshake driver

#![allow(dead_code)]

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keystash_core::{KeystoreBuilder, KeystoreConfig};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, Connection, ServerConfig, ServerConnection};

/// Cheap key derivation so sealing stays fast in tests
pub const FAST_KDF: NonZeroU32 = match NonZeroU32::new(1_000) {
    Some(n) => n,
    None => unreachable!(),
};

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// DER bytes of the first `block_type` block in a fixture
pub fn fixture_der(name: &str, block_type: &str) -> Vec<u8> {
    let bytes = std::fs::read(fixture(name)).unwrap();
    keystash_core::pem::decode(&bytes, block_type).unwrap().unwrap()
}

pub fn builder(keystore: &Path) -> KeystoreBuilder {
    KeystoreBuilder::from_config(KeystoreConfig::new(keystore).with_kdf_iterations(FAST_KDF))
}

fn pump(from: &mut Connection, to: &mut Connection) -> Result<(), rustls::Error> {
    let mut buf = Vec::new();
    while from.wants_write() {
        from.write_tls(&mut buf).unwrap();
    }

    let mut pending = &buf[..];
    while !pending.is_empty() {
        to.read_tls(&mut pending).unwrap();
        to.process_new_packets()?;
    }
    Ok(())
}

/// Drive a full handshake between in-memory client and server connections.
pub fn handshake(
    client_config: Arc<ClientConfig>,
    server_config: Arc<ServerConfig>,
    server_name: &str,
) -> Result<(Connection, Connection), rustls::Error> {
    let name = ServerName::try_from(server_name.to_string()).unwrap();
    let mut client = Connection::from(ClientConnection::new(client_config, name)?);
    let mut server = Connection::from(ServerConnection::new(server_config)?);

    for _ in 0..16 {
        pump(&mut client, &mut server)?;
        pump(&mut server, &mut client)?;
        if !client.is_handshaking() && !server.is_handshaking() {
            return Ok((client, server));
        }
    }
    Err(rustls::Error::General("handshake did not complete".to_string()))
}
