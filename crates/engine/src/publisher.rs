// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Publisher: frames and compresses batches onto a mutually-authenticated
//! TLS stream, retrying the whole payload on any transport failure.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lsf_core::{send_with_deadline, Batch, NetworkConfig, Record, WorkerBase, WorkerError, WorkerHandle};
use rand::Rng;
use rustls_pki_types::ServerName;
use std::io::{self, BufReader, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

const MAGIC_WINDOW: &[u8; 2] = b"1W";
const MAGIC_COMPRESSED: &[u8; 2] = b"1C";
const MAGIC_DATA: &[u8; 2] = b"1D";
const ACK_LEN: usize = 6;
const ZLIB_LEVEL: u32 = 3;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const FORWARD_SEND_DEADLINE: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct Publisher {
    base: WorkerBase,
    network: NetworkConfig,
    hostname: String,
    tls_config: Option<Arc<rustls::ClientConfig>>,
}

impl Publisher {
    pub fn new(network: NetworkConfig, hostname: impl Into<String>) -> (Self, WorkerHandle) {
        let (base, handle) = WorkerBase::new("publisher");
        (
            Self {
                base,
                network,
                hostname: hostname.into(),
                tls_config: None,
            },
            handle,
        )
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    /// Build the client TLS config from the configured CA and, if
    /// present, the client certificate/key pair for mutual auth.
    pub fn initialize(&mut self) -> Result<(), WorkerError> {
        // Idempotent; the agent binary normally installs this once at
        // startup, but a caller exercising this worker on its own (tests,
        // embedding) still needs a provider in place.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let mut roots = rustls::RootCertStore::empty();
        if let Some(ca_path) = &self.network.ssl_ca {
            info!(ca = ca_path, "loading trusted CA certificate");
            let pem = std::fs::read(ca_path)
                .map_err(|e| WorkerError::init_with_cause(self.name(), "read CA certificate", e))?;
            let cert = rustls_pemfile::certs(&mut BufReader::new(pem.as_slice()))
                .next()
                .ok_or_else(|| WorkerError::init(self.name(), "no certificate found in CA file"))?
                .map_err(|e| WorkerError::init_with_cause(self.name(), "parse CA certificate", e))?;
            roots
                .add(cert)
                .map_err(|e| WorkerError::init(self.name(), format!("invalid CA certificate: {e}")))?;
        }

        let builder = rustls::ClientConfig::builder().with_root_certificates(roots);

        let tls_config = match (&self.network.ssl_certificate, &self.network.ssl_key) {
            (Some(cert_path), Some(key_path)) => {
                info!(cert = cert_path, key = key_path, "loading client ssl certificate");
                let cert_pem = std::fs::read(cert_path).map_err(|e| {
                    WorkerError::init_with_cause(self.name(), "read client certificate", e)
                })?;
                let key_pem = std::fs::read(key_path)
                    .map_err(|e| WorkerError::init_with_cause(self.name(), "read client key", e))?;
                let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem.as_slice()))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| WorkerError::init_with_cause(self.name(), "parse client certificate", e))?;
                let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem.as_slice()))
                    .map_err(|e| WorkerError::init_with_cause(self.name(), "parse client key", e))?
                    .ok_or_else(|| WorkerError::init(self.name(), "no private key found in client key file"))?;
                builder
                    .with_client_auth_cert(certs, key)
                    .map_err(|e| WorkerError::init(self.name(), format!("invalid client certificate: {e}")))?
            }
            (None, None) => builder.with_no_client_auth(),
            _ => {
                return Err(WorkerError::init(
                    self.name(),
                    "both ssl certificate and ssl key must be set, or neither",
                ));
            }
        };

        self.tls_config = Some(Arc::new(tls_config));
        Ok(())
    }

    pub async fn work(
        mut self,
        mut inbound: mpsc::Receiver<Batch>,
        out: mpsc::Sender<Batch>,
        err_tx: mpsc::Sender<WorkerError>,
    ) {
        let Some(tls_config) = self.tls_config.clone() else {
            let _ = err_tx
                .send(WorkerError::init(self.name(), "initialize was not called"))
                .await;
            return;
        };

        let mut socket = match self.connect(&tls_config).await {
            Some(socket) => socket,
            None => {
                debug!("publisher shutdown requested before first connection");
                return;
            }
        };
        info!("publisher working");

        loop {
            tokio::select! {
                _ = self.base.ctl_rx() => {
                    debug!("publisher shutdown requested");
                    return;
                }
                batch = inbound.recv() => {
                    let Some(batch) = batch else {
                        debug!("inbound batch channel closed, publisher exiting");
                        return;
                    };
                    if batch.is_empty() {
                        continue;
                    }

                    // 1-based within each batch, per the wire protocol.
                    let mut sequence: u32 = 0;
                    let payload = match compress(&batch, &mut sequence, &self.hostname) {
                        Ok(payload) => payload,
                        Err(e) => {
                            let _ = err_tx.send(WorkerError::io_with_cause(self.name(), "compress batch", e)).await;
                            return;
                        }
                    };

                    loop {
                        match self.send_and_ack(&mut socket, batch.len(), &payload).await {
                            Ok(()) => break,
                            Err(e) => {
                                warn!(error = %e, "socket error, will reconnect");
                                match self.connect(&tls_config).await {
                                    Some(new_socket) => socket = new_socket,
                                    None => {
                                        debug!("publisher shutdown requested mid-reconnect");
                                        return;
                                    }
                                }
                            }
                        }
                    }

                    if let Err(e) = send_with_deadline(self.name(), &out, batch, FORWARD_SEND_DEADLINE).await {
                        let _ = err_tx.send(e).await;
                        return;
                    }
                }
            }
        }
    }

    /// Write the framed, already-compressed payload and block for its
    /// ack, all under one network-timeout deadline. Any failure at any
    /// step means the whole payload must be resent on a fresh connection.
    async fn send_and_ack(
        &self,
        socket: &mut TlsStream<TcpStream>,
        record_count: usize,
        payload: &[u8],
    ) -> Result<(), WorkerError> {
        let attempt = async {
            socket.write_all(MAGIC_WINDOW).await?;
            socket.write_all(&(record_count as u32).to_be_bytes()).await?;
            socket.write_all(MAGIC_COMPRESSED).await?;
            socket.write_all(&(payload.len() as u32).to_be_bytes()).await?;
            socket.write_all(payload).await?;

            let mut ack = [0u8; ACK_LEN];
            socket.read_exact(&mut ack).await?;
            Ok::<(), io::Error>(())
        };

        tokio::time::timeout(self.network.timeout(), attempt)
            .await
            .map_err(|_| WorkerError::timeout(self.name(), "send/ack round trip timed out"))?
            .map_err(|e| WorkerError::io_with_cause(self.name(), "send or ack failed", e))
    }

    /// Retry connecting indefinitely, with a fixed backoff between
    /// attempts, until a handshake succeeds or shutdown is requested.
    async fn connect(&mut self, tls_config: &Arc<rustls::ClientConfig>) -> Option<TlsStream<TcpStream>> {
        loop {
            match self.try_connect_once(tls_config).await {
                Ok(socket) => return Some(socket),
                Err(e) => {
                    warn!(error = %e, "connect failed, retrying");
                    tokio::select! {
                        _ = self.base.ctl_rx() => return None,
                        _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                    }
                }
            }
        }
    }

    async fn try_connect_once(
        &self,
        tls_config: &Arc<rustls::ClientConfig>,
    ) -> Result<TlsStream<TcpStream>, WorkerError> {
        if self.network.servers.is_empty() {
            return Err(WorkerError::init(self.name(), "no servers configured"));
        }
        let hostport = &self.network.servers[rand::rng().random_range(0..self.network.servers.len())];
        let (host, port) = parse_hostport(hostport)
            .map_err(|e| WorkerError::io(self.name(), e))?;

        let resolved: Vec<std::net::SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| WorkerError::io_with_cause(self.name(), "dns lookup failed", e))?
            .collect();
        if resolved.is_empty() {
            return Err(WorkerError::io(
                self.name(),
                format!("dns lookup for {host} returned no addresses"),
            ));
        }
        let addr = resolved[rand::rng().random_range(0..resolved.len())];

        debug!(%addr, host, "connecting");
        let tcp = tokio::time::timeout(self.network.timeout(), TcpStream::connect(addr))
            .await
            .map_err(|_| WorkerError::timeout(self.name(), "tcp connect timed out"))?
            .map_err(|e| WorkerError::io_with_cause(self.name(), "tcp connect failed", e))?;

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| WorkerError::io(self.name(), format!("invalid server name {host}: {e}")))?;

        let connector = TlsConnector::from(tls_config.clone());
        let tls = tokio::time::timeout(self.network.timeout(), connector.connect(server_name, tcp))
            .await
            .map_err(|_| WorkerError::timeout(self.name(), "tls handshake timed out"))?
            .map_err(|e| WorkerError::io_with_cause(self.name(), "tls handshake failed", e))?;

        info!(%addr, host, "connected");
        Ok(tls)
    }
}

/// Split `"host:port"`. Kept as a plain string op rather than pulling in
/// a regex dependency for what's one delimiter.
fn parse_hostport(hostport: &str) -> Result<(&str, u16), String> {
    let (host, port) = hostport
        .rsplit_once(':')
        .ok_or_else(|| format!("invalid host:port: {hostport}"))?;
    let port: u16 = port
        .parse()
        .map_err(|_| format!("invalid port in {hostport}"))?;
    Ok((host, port))
}

fn compress(batch: &Batch, sequence: &mut u32, hostname: &str) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(ZLIB_LEVEL));
    for record in &batch.records {
        *sequence = sequence.wrapping_add(1);
        write_data_frame(&mut encoder, record, *sequence, hostname)?;
    }
    encoder.finish()
}

fn write_data_frame(out: &mut impl Write, record: &Record, sequence: u32, hostname: &str) -> io::Result<()> {
    out.write_all(MAGIC_DATA)?;
    out.write_all(&sequence.to_be_bytes())?;
    let pair_count = 4 + record.fields.len() as u32;
    out.write_all(&pair_count.to_be_bytes())?;
    write_kv(out, "file", &record.source)?;
    write_kv(out, "host", hostname)?;
    write_kv(out, "offset", &record.offset.to_string())?;
    write_kv(out, "line", &record.text)?;
    for (k, v) in record.fields.iter() {
        write_kv(out, k, v)?;
    }
    Ok(())
}

fn write_kv(out: &mut impl Write, key: &str, value: &str) -> io::Result<()> {
    out.write_all(&(key.len() as u32).to_be_bytes())?;
    out.write_all(key.as_bytes())?;
    out.write_all(&(value.len() as u32).to_be_bytes())?;
    out.write_all(value.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsf_core::FileIdentity;
    use std::collections::BTreeMap;
    use std::io::Read;

    fn record(source: &str, offset: i64, text: &str, fields: BTreeMap<String, String>) -> Record {
        Record::new(
            source,
            offset,
            1,
            text,
            Arc::new(fields),
            FileIdentity {
                inode: 1,
                device: 1,
                size: 0,
                mtime_secs: 0,
            },
        )
    }

    fn read_u32(buf: &[u8], at: &mut usize) -> u32 {
        let bytes: [u8; 4] = buf[*at..*at + 4].try_into().unwrap();
        *at += 4;
        u32::from_be_bytes(bytes)
    }

    fn read_string(buf: &[u8], at: &mut usize) -> String {
        let len = read_u32(buf, at) as usize;
        let s = String::from_utf8(buf[*at..*at + len].to_vec()).unwrap();
        *at += len;
        s
    }

    #[test]
    fn parses_host_and_port() {
        assert_eq!(parse_hostport("collector.example.com:5043").unwrap(), ("collector.example.com", 5043));
    }

    #[test]
    fn rejects_hostport_without_colon() {
        assert!(parse_hostport("collector.example.com").is_err());
    }

    #[test]
    fn rejects_hostport_with_non_numeric_port() {
        assert!(parse_hostport("collector.example.com:https").is_err());
    }

    #[test]
    fn compress_produces_decodable_frame_with_fixed_and_user_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("env".to_string(), "prod".to_string());
        let batch = Batch::new(vec![record("/var/log/app.log", 42, "boot complete", fields)]);

        let mut sequence = 0;
        let compressed = compress(&batch, &mut sequence, "web-1").unwrap();
        assert_eq!(sequence, 1);

        let mut decoder = flate2::read::ZlibDecoder::new(compressed.as_slice());
        let mut raw = Vec::new();
        decoder.read_to_end(&mut raw).unwrap();

        let mut at = 0;
        assert_eq!(&raw[at..at + 2], MAGIC_DATA);
        at += 2;
        assert_eq!(read_u32(&raw, &mut at), 1); // sequence
        assert_eq!(read_u32(&raw, &mut at), 5); // 4 fixed + 1 user field

        assert_eq!(read_string(&raw, &mut at), "file");
        assert_eq!(read_string(&raw, &mut at), "/var/log/app.log");
        assert_eq!(read_string(&raw, &mut at), "host");
        assert_eq!(read_string(&raw, &mut at), "web-1");
        assert_eq!(read_string(&raw, &mut at), "offset");
        assert_eq!(read_string(&raw, &mut at), "42");
        assert_eq!(read_string(&raw, &mut at), "line");
        assert_eq!(read_string(&raw, &mut at), "boot complete");
        assert_eq!(read_string(&raw, &mut at), "env");
        assert_eq!(read_string(&raw, &mut at), "prod");
        assert_eq!(at, raw.len());
    }

    #[test]
    fn sequence_increments_across_records_in_a_batch() {
        let batch = Batch::new(vec![
            record("/a.log", 0, "one", BTreeMap::new()),
            record("/a.log", 4, "two", BTreeMap::new()),
        ]);
        let mut sequence = 0;
        compress(&batch, &mut sequence, "host").unwrap();
        assert_eq!(sequence, 2);
    }
}
