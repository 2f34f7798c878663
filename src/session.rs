//! SNMP session: get and set operations against one agent.

use std::{io, net::SocketAddr};

use tokio::sync::Mutex;

use crate::{
    ber::BerError,
    exchange::{exchange, RetryPolicy, SnmpError},
    oid::Oid,
    pdu::{generate_request_id, SnmpMessage},
    transport::{Transport, UdpTransport},
};

/// A session with a single agent.
///
/// Only one exchange runs at a time; concurrent calls on the same session wait
/// for the one in flight to finish.
pub struct Session<T = UdpTransport> {
    transport: T,
    retry: RetryPolicy,
    in_flight: Mutex<()>,
}

impl Session<UdpTransport> {
    /// Binds a UDP socket on `local_addr` and targets `agent_addr`.
    pub async fn bind(local_addr: SocketAddr, agent_addr: SocketAddr) -> io::Result<Self> {
        Ok(Self::with_transport(
            UdpTransport::bind(local_addr, agent_addr).await?,
        ))
    }

    /// Returns the agent address requests are sent to.
    pub fn agent_addr(&self) -> SocketAddr {
        self.transport.agent_addr()
    }

    /// Retargets subsequent requests to another agent.
    pub fn set_agent_addr(&mut self, agent_addr: SocketAddr) {
        self.transport.set_agent_addr(agent_addr);
    }

    /// Returns the local address of the session socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Moves the session socket to another local address or port.
    pub async fn rebind(&mut self, local_addr: SocketAddr) -> io::Result<()> {
        self.transport.rebind(local_addr).await
    }
}

impl<T: Transport> Session<T> {
    /// Creates a session over an existing transport with the default retry policy.
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            in_flight: Mutex::new(()),
        }
    }

    /// Replaces the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the retry policy in use.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Sends a SetRequest with an INTEGER value (0..=65535).
    pub async fn set_integer(
        &self,
        community: &str,
        oid: &str,
        value: i64,
    ) -> Result<(), SnmpError> {
        let oid = parse_oid(oid)?;
        self.run(|request_id| {
            SnmpMessage::set_integer_request(community, request_id, oid, value)
        })
        .await
        .map(|_| ())
    }

    /// Sends a SetRequest with a text value.
    ///
    /// A dotted quad is sent as IpAddress, anything else as OCTET STRING.
    pub async fn set_string(
        &self,
        community: &str,
        oid: &str,
        value: &str,
    ) -> Result<(), SnmpError> {
        let oid = parse_oid(oid)?;
        self.run(|request_id| {
            SnmpMessage::set_string_request(community, request_id, oid, value)
        })
        .await
        .map(|_| ())
    }

    /// Sends a GetRequest and returns the value as text.
    ///
    /// INTEGER values are rendered in decimal, IpAddress as a dotted quad and
    /// OCTET STRING as Latin-1 text.
    pub async fn get(&self, community: &str, oid: &str) -> Result<String, SnmpError> {
        let oid = parse_oid(oid)?;
        let response = self
            .run(|request_id| SnmpMessage::get_request(community, request_id, oid))
            .await?;

        let varbind = response
            .pdu
            .varbinds
            .first()
            .ok_or(SnmpError::MalformedResponse(BerError::MissingField("varbind")))?;
        varbind
            .scalar()
            .and_then(|value| value.render())
            .map_err(SnmpError::MalformedResponse)
    }

    async fn run<F>(&self, build: F) -> Result<SnmpMessage, SnmpError>
    where
        F: FnOnce(i64) -> Result<SnmpMessage, BerError>,
    {
        let request_id = generate_request_id();
        let request = build(request_id).map_err(SnmpError::Encoding)?;
        let datagram = request.encode().map_err(SnmpError::Encoding)?;

        let requested = &request.pdu.varbinds[0].oid;

        let _guard = self.in_flight.lock().await;
        log::debug!(
            "Sending {:?} {} (request {})",
            request.pdu.kind,
            requested,
            request_id
        );
        let response = exchange(&self.transport, &datagram, request_id, &self.retry).await?;
        check_binding(&response, requested)?;
        Ok(response)
    }
}

/// Checks that a noError response binds the requested OID.
fn check_binding(response: &SnmpMessage, requested: &Oid) -> Result<(), SnmpError> {
    match response.pdu.varbinds.first() {
        Some(varbind) if varbind.oid != *requested => {
            log::debug!("Response binds {}, requested {}", varbind.oid, requested);
            Err(SnmpError::MalformedResponse(BerError::UnexpectedOid {
                expected: requested.clone(),
                found: varbind.oid.clone(),
            }))
        }
        _ => Ok(()),
    }
}

fn parse_oid(oid: &str) -> Result<Oid, SnmpError> {
    let oid = Oid::parse(oid).map_err(|e| SnmpError::Encoding(e.into()))?;
    oid.to_ber().map_err(|e| SnmpError::Encoding(e.into()))?;
    Ok(oid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ber::{ScalarValue, TlvRecord},
        pdu::PduKind,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport that counts sends and never answers.
    #[derive(Default)]
    struct SilentTransport {
        sends: AtomicUsize,
    }

    impl Transport for SilentTransport {
        async fn send(&self, _datagram: &[u8]) -> io::Result<()> {
            self.sends.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn recv(&self) -> io::Result<Vec<u8>> {
            std::future::pending().await
        }
    }

    /// Transport that answers each request with one binding for `reply_oid`.
    struct AnsweringTransport {
        reply_oid: Oid,
        error_status: u64,
        value: TlvRecord,
        pending: std::sync::Mutex<Option<Vec<u8>>>,
    }

    impl AnsweringTransport {
        fn new(reply_oid: &str, error_status: u64, value: TlvRecord) -> Self {
            Self {
                reply_oid: Oid::parse(reply_oid).unwrap(),
                error_status,
                value,
                pending: std::sync::Mutex::new(None),
            }
        }
    }

    impl Transport for AnsweringTransport {
        async fn send(&self, datagram: &[u8]) -> io::Result<()> {
            let request = SnmpMessage::decode(datagram).unwrap();
            let mut response = SnmpMessage::request(
                PduKind::GetResponse,
                "public",
                request.pdu.request_id,
                self.reply_oid.clone(),
                ScalarValue::Null,
            )
            .unwrap();
            response.pdu.error_status = self.error_status;
            response.pdu.varbinds[0].value = self.value.clone();
            *self.pending.lock().unwrap() = Some(response.encode().unwrap());
            Ok(())
        }

        async fn recv(&self) -> io::Result<Vec<u8>> {
            let next = self.pending.lock().unwrap().take();
            match next {
                Some(datagram) => Ok(datagram),
                None => std::future::pending().await,
            }
        }
    }

    fn counter32() -> TlvRecord {
        TlvRecord {
            tag: 0x41,
            length: 1,
            payload: vec![0x07],
        }
    }

    #[tokio::test]
    async fn test_get_renders_matching_binding() {
        let value = ScalarValue::Integer(5).to_record().unwrap();
        let session =
            Session::with_transport(AnsweringTransport::new("1.3.6.1.2.1.1.5.0", 0, value));
        assert_eq!(session.get("public", "1.3.6.1.2.1.1.5.0").await.unwrap(), "5");
    }

    #[tokio::test]
    async fn test_get_rejects_other_binding() {
        let value = ScalarValue::Integer(5).to_record().unwrap();
        let session =
            Session::with_transport(AnsweringTransport::new("1.3.6.1.2.1.1.6.0", 0, value));
        let err = session.get("public", "1.3.6.1.2.1.1.5.0").await.unwrap_err();
        assert!(matches!(
            err,
            SnmpError::MalformedResponse(BerError::UnexpectedOid { .. })
        ));
    }

    #[tokio::test]
    async fn test_agent_status_reported_before_value_decoding() {
        let session = Session::with_transport(AnsweringTransport::new(
            "1.3.6.1.2.1.1.5.0",
            5,
            counter32(),
        ));
        let err = session.get("public", "1.3.6.1.2.1.1.5.0").await.unwrap_err();
        assert!(matches!(err, SnmpError::GenErr));
        assert_eq!(err.code(), 5);
    }

    #[tokio::test]
    async fn test_unsupported_value_is_malformed() {
        let session = Session::with_transport(AnsweringTransport::new(
            "1.3.6.1.2.1.1.5.0",
            0,
            counter32(),
        ));
        let err = session.get("public", "1.3.6.1.2.1.1.5.0").await.unwrap_err();
        assert!(matches!(
            err,
            SnmpError::MalformedResponse(BerError::UnsupportedType(0x41))
        ));
    }

    #[tokio::test]
    async fn test_invalid_oid_is_not_sent() {
        let session = Session::with_transport(SilentTransport::default());
        let err = session.get("public", "1.3.x").await.unwrap_err();
        assert!(matches!(err, SnmpError::Encoding(_)));
        assert_eq!(err.code(), 8);
        let err = session.get("public", "5.3.6").await.unwrap_err();
        assert!(matches!(err, SnmpError::Encoding(_)));
        assert_eq!(session.transport.sends.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_integer_out_of_range_is_not_sent() {
        let session = Session::with_transport(SilentTransport::default());
        let err = session
            .set_integer("private", "1.3.6.1.2.1.1.5.0", 70000)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SnmpError::Encoding(BerError::IntegerOutOfRange(70000))
        ));
        assert_eq!(session.transport.sends.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_non_latin1_community_is_not_sent() {
        let session = Session::with_transport(SilentTransport::default());
        let err = session
            .set_string("\u{263A}", "1.3.6.1.2.1.1.5.0", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, SnmpError::Encoding(BerError::NotLatin1(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_retry_policy() {
        let policy = RetryPolicy::new(vec![std::time::Duration::from_millis(100); 2]).unwrap();
        let session = Session::with_transport(SilentTransport::default()).with_retry(policy);
        let err = session
            .get("public", "1.3.6.1.2.1.1.5.0")
            .await
            .unwrap_err();
        assert!(matches!(err, SnmpError::Timeout));
        assert_eq!(session.transport.sends.load(Ordering::Relaxed), 2);
        assert_eq!(session.retry().attempts(), 2);
    }
}
