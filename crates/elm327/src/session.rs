//! OBD-II Session over an ELM327 Adapter
//!
//! Owns the byte channel, performs the reset/echo-off handshake, discovers
//! which PIDs the vehicle supports, and exposes typed sensor accessors. The
//! protocol is strictly half-duplex: every operation is one command write
//! followed by one prompt-terminated response read, and nothing is issued
//! while a response is outstanding.

use std::collections::BTreeSet;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::bitmap::extract_pids;
use crate::error::ObdError;
use crate::frame::{fold_hex, parse_mode1, trim_prompt};
use crate::pid::{Pid, Reading};

/// The seven Mode-01 support-bitmap banks, in walking order.
const BANK_BASES: [u8; 7] = [0x00, 0x20, 0x40, 0x60, 0x80, 0xA0, 0xC0];

/// Tuning knobs for session construction
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Settle delay after `ATZ`, letting the adapter finish its boot banner
    /// before we read. Reading earlier risks interleaving with the banner.
    pub reset_settle: Duration,
    /// Settle delay before reading the `ATE0` acknowledgment
    pub echo_settle: Duration,
    /// How long to wait for the `>` prompt terminating each response
    pub response_timeout: Duration,
    /// Whether discovery seeds the supported set with PID 0, the bank-0
    /// bitmap-request PID. Implementations of this protocol family disagree
    /// on recording it; `false` keeps only PIDs the bitmaps announce.
    pub include_bank_zero: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reset_settle: Duration::from_millis(500),
            echo_settle: Duration::from_millis(100),
            response_timeout: Duration::from_millis(2000),
            include_bank_zero: false,
        }
    }
}

/// A live session with an ELM327-compatible adapter.
///
/// Generic over any `AsyncRead + AsyncWrite` channel; opening and
/// configuring the underlying device (path, baud rate, OS timeouts) is the
/// caller's job. A `tokio_serial::SerialStream` satisfies the bound, as does
/// an in-memory duplex stream in tests.
pub struct Session<C> {
    channel: C,
    config: SessionConfig,
    adapter_id: String,
    /// Populated once during construction, immutable afterwards
    supported: BTreeSet<u8>,
}

impl<C: AsyncRead + AsyncWrite + Unpin> Session<C> {
    /// Connect with default [`SessionConfig`].
    pub async fn connect(channel: C) -> Result<Self, ObdError> {
        Self::connect_with(channel, SessionConfig::default()).await
    }

    /// Perform the full handshake: reset, capture the adapter identity,
    /// disable command echo, and discover supported PIDs.
    ///
    /// Any transport or parse failure aborts construction; there is no
    /// partially-usable session.
    pub async fn connect_with(channel: C, config: SessionConfig) -> Result<Self, ObdError> {
        let mut session = Self {
            channel,
            config,
            adapter_id: String::new(),
            supported: BTreeSet::new(),
        };

        debug!("resetting adapter");
        session.send("ATZ").await?;
        sleep(session.config.reset_settle).await;
        let banner = session.read_response().await?;
        session.adapter_id = String::from_utf8_lossy(trim_prompt(&banner)).into_owned();
        info!("adapter identified as '{}'", session.adapter_id);

        debug!("disabling echo");
        session.send("ATE0").await?;
        sleep(session.config.echo_settle).await;
        session.read_response().await?;

        debug!("discovering supported PIDs");
        session.supported = session.discover_pids().await?;
        info!("vehicle reports {} supported PIDs", session.supported.len());

        Ok(session)
    }

    /// The identity string the adapter printed after reset
    pub fn adapter_id(&self) -> &str {
        &self.adapter_id
    }

    /// PID numbers announced by the vehicle's support bitmaps
    pub fn supported_pids(&self) -> &BTreeSet<u8> {
        &self.supported
    }

    /// Whether the vehicle announced support for `pid`
    pub fn supports(&self, pid: Pid) -> bool {
        self.supported.contains(&pid.code())
    }

    /// Execute an arbitrary command and return its trimmed response.
    pub async fn exec(&mut self, cmd: &str) -> Result<Vec<u8>, ObdError> {
        self.send(cmd).await?;
        let raw = self.read_response().await?;
        Ok(trim_prompt(&raw).to_vec())
    }

    /// Query `pid` under Mode 01 and return the payload hex digits.
    pub async fn current_hex(&mut self, pid: u8) -> Result<Vec<u8>, ObdError> {
        let raw = self.exec(&format!("01{pid:02x}")).await?;
        parse_mode1(&raw)
    }

    /// Query `pid` under Mode 01 and fold the payload into an integer.
    pub async fn current_int(&mut self, pid: u8) -> Result<u64, ObdError> {
        let digits = self.current_hex(pid).await?;
        fold_hex(&digits)
    }

    /// Read one sensor through the PID registry: support check, query,
    /// payload-width check, scaling formula.
    ///
    /// An unsupported PID fails before anything is written to the channel.
    /// Per-read failures leave the session usable.
    pub async fn read_sensor(&mut self, pid: Pid) -> Result<Reading, ObdError> {
        if !self.supports(pid) {
            return Err(ObdError::PidNotSupported(pid.code()));
        }

        let digits = self.current_hex(pid.code()).await?;
        if digits.len() != pid.data_bytes() * 2 {
            return Err(ObdError::UnexpectedResponse(format!(
                "PID {:02x}: expected {} payload bytes, got {} hex digits",
                pid.code(),
                pid.data_bytes(),
                digits.len()
            )));
        }
        let raw = fold_hex(&digits)?;

        Ok(Reading {
            pid,
            name: pid.name(),
            value: pid.decode(raw),
            unit: pid.unit(),
        })
    }

    /// Calculated engine load, percent
    pub async fn engine_load(&mut self) -> Result<f64, ObdError> {
        Ok(self.read_sensor(Pid::EngineLoad).await?.value)
    }

    /// Coolant temperature, °C
    pub async fn coolant_temp(&mut self) -> Result<i32, ObdError> {
        Ok(self.read_sensor(Pid::CoolantTemp).await?.value as i32)
    }

    /// Engine speed, rpm
    pub async fn engine_rpm(&mut self) -> Result<f64, ObdError> {
        Ok(self.read_sensor(Pid::Rpm).await?.value)
    }

    /// Vehicle speed, km/h
    pub async fn vehicle_speed(&mut self) -> Result<u8, ObdError> {
        Ok(self.read_sensor(Pid::Speed).await?.value as u8)
    }

    /// Throttle position, percent
    pub async fn throttle_position(&mut self) -> Result<f64, ObdError> {
        Ok(self.read_sensor(Pid::ThrottlePosition).await?.value)
    }

    /// Fuel tank level, percent
    pub async fn fuel_level(&mut self) -> Result<f64, ObdError> {
        Ok(self.read_sensor(Pid::FuelLevel).await?.value)
    }

    /// Absolute barometric pressure, kPa
    pub async fn barometric_pressure(&mut self) -> Result<u8, ObdError> {
        Ok(self.read_sensor(Pid::BarometricPressure).await?.value as u8)
    }

    /// Walk the support-bitmap banks, unioning each bank's PIDs into the
    /// result. The top bit of each bank announces the next bank's request
    /// PID; discovery stops at the first bank that doesn't.
    async fn discover_pids(&mut self) -> Result<BTreeSet<u8>, ObdError> {
        let mut supported = BTreeSet::new();
        if self.config.include_bank_zero {
            supported.insert(0);
        }

        for (i, &base) in BANK_BASES.iter().enumerate() {
            debug!("querying PID bank {:02x}", base);
            let payload = self.current_hex(base).await?;
            supported.append(&mut extract_pids(&payload, base)?);

            match BANK_BASES.get(i + 1) {
                Some(next) if supported.contains(next) => continue,
                _ => break,
            }
        }

        Ok(supported)
    }

    async fn send(&mut self, cmd: &str) -> Result<(), ObdError> {
        debug!("sending '{}'", cmd);
        self.channel.write_all(format!("{cmd}\r\n").as_bytes()).await?;
        Ok(())
    }

    /// Accumulate reads until the adapter's `>` prompt shows up, bounded by
    /// the configured response timeout. One prompt terminates one logical
    /// response, however the transport splits it across reads.
    async fn read_response(&mut self) -> Result<Vec<u8>, ObdError> {
        let window = self.config.response_timeout;

        let read_until_prompt = async {
            let mut buf = Vec::with_capacity(64);
            let mut chunk = [0u8; 64];
            loop {
                let n = self.channel.read(&mut chunk).await?;
                if n == 0 {
                    return Err(ObdError::Transport(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "channel closed before adapter prompt",
                    )));
                }
                buf.extend_from_slice(&chunk[..n]);
                if chunk[..n].contains(&b'>') {
                    return Ok(buf);
                }
            }
        };

        match timeout(window, read_until_prompt).await {
            Ok(res) => res,
            Err(_) => Err(ObdError::PromptTimeout(window.as_millis() as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAdapter;

    /// Zero settle delays so tests don't sleep through the handshake.
    fn fast_config() -> SessionConfig {
        SessionConfig {
            reset_settle: Duration::ZERO,
            echo_settle: Duration::ZERO,
            response_timeout: Duration::from_millis(500),
            ..SessionConfig::default()
        }
    }

    async fn connect(mock: &MockAdapter) -> Session<tokio::io::DuplexStream> {
        Session::connect_with(mock.channel(), fast_config())
            .await
            .expect("handshake failed")
    }

    fn pid_set(pids: &[u8]) -> BTreeSet<u8> {
        pids.iter().copied().collect()
    }

    #[tokio::test]
    async fn handshake_captures_identity_and_disables_echo() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 03");

        let session = connect(&mock).await;
        assert_eq!(session.adapter_id(), "ELM327 v1.5");
        assert_eq!(mock.received(), vec!["ATZ", "ATE0", "0100"]);
        assert_eq!(*session.supported_pids(), pid_set(&[7, 8]));
    }

    #[tokio::test]
    async fn include_bank_zero_seeds_pid_zero() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 03");

        let config = SessionConfig {
            include_bank_zero: true,
            ..fast_config()
        };
        let session = Session::connect_with(mock.channel(), config).await.unwrap();
        assert_eq!(*session.supported_pids(), pid_set(&[0, 7, 8]));
    }

    #[tokio::test]
    async fn discovery_walks_all_seven_banks() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 01 00 00 01");
        mock.respond("0120", "41 20 01 00 00 01");
        mock.respond("0140", "41 40 01 00 00 01");
        mock.respond("0160", "41 60 01 00 00 01");
        mock.respond("0180", "41 80 01 00 00 01");
        mock.respond("01a0", "41 a0 01 00 00 01");
        mock.respond("01c0", "41 c0 01 00 00 01");

        let session = connect(&mock).await;
        assert_eq!(
            *session.supported_pids(),
            pid_set(&[8, 32, 40, 64, 72, 96, 104, 128, 136, 160, 168, 192, 200, 224])
        );
    }

    #[tokio::test]
    async fn discovery_stops_at_first_unannounced_bank() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 00 00 00 01");
        mock.respond("0120", "41 20 00 02 00 00");

        let session = connect(&mock).await;
        assert_eq!(*session.supported_pids(), pid_set(&[32, 47]));
        assert!(!mock.received().contains(&"0140".to_string()));
    }

    #[tokio::test]
    async fn discovery_parse_error_fails_construction() {
        let mock = MockAdapter::new();
        // Unknown command -> the adapter's '?' reply, which is not a 41 echo
        let err = Session::connect_with(mock.channel(), fast_config())
            .await
            .err()
            .expect("construction should fail");
        assert!(matches!(err, ObdError::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn current_int_folds_hex_payload() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 07");
        mock.respond("0106", "41 06 00 00");
        mock.respond("0107", "41 07 55 82 a0");
        mock.respond("0108", "41 08 F");

        let mut session = connect(&mock).await;
        assert_eq!(session.current_int(6).await.unwrap(), 0);
        assert_eq!(session.current_int(7).await.unwrap(), 5_604_000);
        assert_eq!(session.current_int(8).await.unwrap(), 15);
    }

    #[tokio::test]
    async fn engine_load_boundaries() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 10");
        mock.respond("0104", "41 04 0A");

        let mut session = connect(&mock).await;
        let load = session.engine_load().await.unwrap();
        assert!((load - 10.0 / 2.55).abs() < 1e-5);

        mock.respond("0104", "41 04 FF");
        let load = session.engine_load().await.unwrap();
        assert!((load - 100.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn coolant_temp_offset() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 08");
        mock.respond("0105", "41 05 29");

        let mut session = connect(&mock).await;
        assert_eq!(session.coolant_temp().await.unwrap(), 1);

        mock.respond("0105", "41 05 FF");
        assert_eq!(session.coolant_temp().await.unwrap(), 215);

        mock.respond("0105", "41 05 00");
        assert_eq!(session.coolant_temp().await.unwrap(), -40);
    }

    #[tokio::test]
    async fn rpm_two_byte_payload() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 00 10");
        mock.respond("010c", "41 0c 55 55");

        let mut session = connect(&mock).await;
        assert!((session.engine_rpm().await.unwrap() - 5461.25).abs() < 1e-5);

        mock.respond("010c", "41 0c FF FF");
        assert!((session.engine_rpm().await.unwrap() - 16383.75).abs() < 1e-5);
    }

    #[tokio::test]
    async fn speed_is_identity() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 00 08");
        mock.respond("010d", "41 0d 55");

        let mut session = connect(&mock).await;
        assert_eq!(session.vehicle_speed().await.unwrap(), 85);
        // Unchanged adapter state decodes to the same value on every read
        assert_eq!(session.vehicle_speed().await.unwrap(), 85);
    }

    #[tokio::test]
    async fn throttle_position_scaling() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 00 00 80");
        mock.respond("0111", "41 11 55");

        let mut session = connect(&mock).await;
        let pos = session.throttle_position().await.unwrap();
        assert!((pos - 85.0 / 2.55).abs() < 1e-5);
    }

    #[tokio::test]
    async fn fuel_level_lives_in_second_bank() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 00 00 00 01");
        mock.respond("0120", "41 20 00 02 00 00");
        mock.respond("012f", "41 2f 55");

        let mut session = connect(&mock).await;
        let level = session.fuel_level().await.unwrap();
        assert!((level - 85.0 / 2.55).abs() < 1e-5);
    }

    #[tokio::test]
    async fn barometric_pressure_lives_in_second_bank() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 00 00 00 01");
        mock.respond("0120", "41 20 00 00 20 00");
        mock.respond("0133", "41 33 55");

        let mut session = connect(&mock).await;
        assert_eq!(session.barometric_pressure().await.unwrap(), 85);
    }

    #[tokio::test]
    async fn unsupported_getter_never_touches_the_channel() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 03");

        let mut session = connect(&mock).await;
        let writes_before = mock.received().len();

        let err = session.engine_load().await.unwrap_err();
        assert!(matches!(err, ObdError::PidNotSupported(0x04)));
        assert_eq!(mock.received().len(), writes_before);
    }

    #[tokio::test]
    async fn failed_read_leaves_session_usable() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 18");
        mock.respond("0104", "NO DATA");
        mock.respond("0105", "41 05 29");

        let mut session = connect(&mock).await;
        assert!(matches!(
            session.engine_load().await,
            Err(ObdError::UnexpectedResponse(_))
        ));
        assert_eq!(session.coolant_temp().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn wrong_payload_width_is_rejected() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 00 10");
        mock.respond("010c", "41 0c 55"); // RPM needs two bytes

        let mut session = connect(&mock).await;
        assert!(matches!(
            session.engine_rpm().await,
            Err(ObdError::UnexpectedResponse(_))
        ));
    }

    #[tokio::test]
    async fn missing_prompt_times_out() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 10");
        mock.respond_verbatim("0104", "41 04 0A"); // no prompt ever arrives

        let config = SessionConfig {
            response_timeout: Duration::from_millis(50),
            ..fast_config()
        };
        let mut session = Session::connect_with(mock.channel(), config).await.unwrap();
        assert!(matches!(
            session.engine_load().await,
            Err(ObdError::PromptTimeout(50))
        ));
    }

    #[tokio::test]
    async fn exec_returns_trimmed_response() {
        let mock = MockAdapter::new();
        mock.respond("0100", "41 00 03");
        mock.respond("ATRV", "12.3V");

        let mut session = connect(&mock).await;
        assert_eq!(session.exec("ATRV").await.unwrap(), b"12.3V");
    }
}
