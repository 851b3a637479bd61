use async_trait::async_trait;
use chrono::Utc;
use std::net::IpAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, trace};

use super::types::ProbeOutcome;

/// Probe capability used by the coordinator.
///
/// Implementations never fail: every network or OS problem is folded into an
/// unreachable outcome. They must finish within their own timeout.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Send one echo request to `address` and try to name it
    async fn probe(&self, address: &str) -> ProbeOutcome;
}

/// Flavour of the system ping utility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingFlavor {
    /// `ping -n 1 -a`, which prints the reverse-resolved name itself
    Windows,
    /// `ping -n -c 1`, name has to be looked up separately
    Unix,
}

impl PingFlavor {
    pub fn current() -> Self {
        if cfg!(windows) { PingFlavor::Windows } else { PingFlavor::Unix }
    }

    /// Arguments for exactly one echo request to `address`
    pub fn args(&self, address: &str, limit: Duration) -> Vec<String> {
        match self {
            PingFlavor::Windows => vec![
                "-n".into(),
                "1".into(),
                "-a".into(),
                "-w".into(),
                limit.as_millis().max(1).to_string(),
                address.into(),
            ],
            PingFlavor::Unix => {
                // whole seconds only, rounded up
                let seconds = limit.as_millis().div_ceil(1000).max(1).to_string();
                let wait_flag = if cfg!(target_os = "macos") { "-t" } else { "-W" };
                // -n: numeric output, the name is looked up separately
                vec!["-n".into(), "-c".into(), "1".into(), wait_flag.into(), seconds, address.into()]
            }
        }
    }
}

/// What a single echo request produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoReply {
    pub replied: bool,
    pub output: String,
    pub elapsed: Duration,
}

impl EchoReply {
    fn timed_out(limit: Duration) -> Self {
        Self {
            replied: false,
            output: format!("no reply within {} ms", limit.as_millis()),
            elapsed: limit,
        }
    }
}

/// Issues echo requests
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn echo(&self, address: &str, limit: Duration) -> EchoReply;
}

/// Reverse name lookups
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn reverse(&self, ip: IpAddr) -> Option<String>;
}

/// Runs the platform `ping` binary
pub struct SystemPing {
    flavor: PingFlavor,
    program: String,
}

impl SystemPing {
    pub fn new(flavor: PingFlavor) -> Self {
        Self::with_program(flavor, "ping")
    }

    pub fn with_program(flavor: PingFlavor, program: impl Into<String>) -> Self {
        Self { flavor, program: program.into() }
    }
}

#[async_trait]
impl Pinger for SystemPing {
    async fn echo(&self, address: &str, limit: Duration) -> EchoReply {
        let start = Instant::now();

        let mut command = Command::new(&self.program);
        command
            .args(self.flavor.args(address, limit))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match timeout(limit, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!(address, error = %e, "Failed to spawn {}", self.program);
                return EchoReply {
                    replied: false,
                    output: format!("failed to run {}: {e}", self.program),
                    elapsed: start.elapsed(),
                };
            }
            Err(_) => return EchoReply::timed_out(limit),
        };

        let elapsed = start.elapsed();
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let text = text.trim().to_string();

        if output.status.success() {
            EchoReply { replied: true, output: text, elapsed }
        } else {
            let text = if text.is_empty() {
                match output.status.code() {
                    Some(code) => format!("ping failed with exit code {code}"),
                    None => "ping terminated by signal".to_string(),
                }
            } else {
                text
            };
            EchoReply { replied: false, output: text, elapsed }
        }
    }
}

/// `getnameinfo` through the `dns-lookup` crate, on the blocking pool
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn reverse(&self, ip: IpAddr) -> Option<String> {
        let name = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip)).await.ok()?.ok()?;
        // getnameinfo hands back the numeric form when there is no PTR record
        if name.is_empty() || name.parse::<IpAddr>().is_ok() { None } else { Some(name) }
    }
}

/// Pull the name out of `ping -a` output.
///
/// Windows prints `Pinging printer.local [10.0.0.5] with 32 bytes of data:`
/// (localised, but the `name [address]` pair is stable), or just the address
/// when it could not resolve one.
pub fn parse_native_hostname(output: &str, address: &str) -> Option<String> {
    let marker = format!("[{address}]");
    output.lines().find_map(|line| {
        let index = line.find(&marker)?;
        let name = line[..index].split_whitespace().last()?;
        (name != address).then(|| name.to_string())
    })
}

async fn echo_before(pinger: &dyn Pinger, address: &str, deadline: Instant) -> EchoReply {
    let budget = deadline.saturating_duration_since(Instant::now());
    match timeout_at(deadline, pinger.echo(address, budget)).await {
        Ok(reply) => reply,
        Err(_) => EchoReply::timed_out(budget),
    }
}

/// Reverse lookup with whatever is left of the deadline
async fn reverse_before(resolver: &dyn Resolver, address: &str, deadline: Instant) -> Option<String> {
    match address.parse::<IpAddr>() {
        Ok(ip) if Instant::now() < deadline => timeout_at(deadline, resolver.reverse(ip)).await.ok().flatten(),
        _ => None,
    }
}

fn finish(reply: EchoReply, hostname: Option<String>) -> ProbeOutcome {
    let checked_at = Utc::now();
    let outcome = if reply.replied {
        ProbeOutcome::reachable(reply.elapsed.as_millis() as u64, checked_at)
    } else {
        ProbeOutcome::unreachable(checked_at)
    };
    outcome.with_hostname(hostname).with_output(reply.output)
}

/// Strategy for platforms whose ping names the host itself.
/// Falls back to `resolver` when the output carries no name.
pub struct NativePingProber {
    pinger: Arc<dyn Pinger>,
    resolver: Arc<dyn Resolver>,
    timeout: Duration,
}

impl NativePingProber {
    pub fn new(pinger: Arc<dyn Pinger>, resolver: Arc<dyn Resolver>, timeout: Duration) -> Self {
        Self { pinger, resolver, timeout }
    }
}

#[async_trait]
impl Prober for NativePingProber {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        let deadline = Instant::now() + self.timeout;
        let reply = echo_before(self.pinger.as_ref(), address, deadline).await;
        let hostname = match parse_native_hostname(&reply.output, address) {
            Some(name) => Some(name),
            None => reverse_before(self.resolver.as_ref(), address, deadline).await,
        };
        trace!(address, replied = reply.replied, ?hostname, "Native ping probe finished");
        finish(reply, hostname)
    }
}

/// Strategy pairing a plain echo request with an explicit reverse lookup
pub struct ReverseDnsProber {
    pinger: Arc<dyn Pinger>,
    resolver: Arc<dyn Resolver>,
    timeout: Duration,
}

impl ReverseDnsProber {
    pub fn new(pinger: Arc<dyn Pinger>, resolver: Arc<dyn Resolver>, timeout: Duration) -> Self {
        Self { pinger, resolver, timeout }
    }
}

#[async_trait]
impl Prober for ReverseDnsProber {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        let deadline = Instant::now() + self.timeout;
        let reply = echo_before(self.pinger.as_ref(), address, deadline).await;

        let hostname = reverse_before(self.resolver.as_ref(), address, deadline).await;

        trace!(address, replied = reply.replied, ?hostname, "Reverse DNS probe finished");
        finish(reply, hostname)
    }
}

/// Pick the probe strategy for the platform we are running on
pub fn prober_for_platform(timeout: Duration) -> Arc<dyn Prober> {
    match PingFlavor::current() {
        PingFlavor::Windows => {
            debug!("Using native ping name resolution");
            Arc::new(NativePingProber::new(
                Arc::new(SystemPing::new(PingFlavor::Windows)),
                Arc::new(SystemResolver),
                timeout,
            ))
        }
        PingFlavor::Unix => {
            debug!("Using ping plus reverse DNS");
            Arc::new(ReverseDnsProber::new(
                Arc::new(SystemPing::new(PingFlavor::Unix)),
                Arc::new(SystemResolver),
                timeout,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct ScriptedPinger {
        replies: HashMap<String, EchoReply>,
    }

    #[async_trait]
    impl Pinger for ScriptedPinger {
        async fn echo(&self, address: &str, _limit: Duration) -> EchoReply {
            match self.replies.get(address) {
                Some(reply) => reply.clone(),
                // silent host: never answers
                None => std::future::pending().await,
            }
        }
    }

    struct TableResolver(HashMap<IpAddr, String>);

    #[async_trait]
    impl Resolver for TableResolver {
        async fn reverse(&self, ip: IpAddr) -> Option<String> {
            self.0.get(&ip).cloned()
        }
    }

    struct HangingResolver;

    #[async_trait]
    impl Resolver for HangingResolver {
        async fn reverse(&self, _ip: IpAddr) -> Option<String> {
            std::future::pending().await
        }
    }

    fn replied(output: &str) -> EchoReply {
        EchoReply { replied: true, output: output.to_string(), elapsed: Duration::from_millis(4) }
    }

    fn reverse_dns_prober(timeout: Duration) -> ReverseDnsProber {
        let pinger = ScriptedPinger {
            replies: HashMap::from([(
                "10.0.0.5".to_string(),
                replied("64 bytes from 10.0.0.5: icmp_seq=1 ttl=64 time=4.01 ms"),
            )]),
        };
        let resolver = TableResolver(HashMap::from([(
            "10.0.0.5".parse().unwrap(),
            "printer.local".to_string(),
        )]));
        ReverseDnsProber::new(Arc::new(pinger), Arc::new(resolver), timeout)
    }

    #[test]
    fn test_unix_args_send_one_request() {
        let args = PingFlavor::Unix.args("10.0.0.5", Duration::from_millis(2500));
        assert_eq!(&args[..3], &["-n", "-c", "1"]);
        assert_eq!(args[4], "3");
        assert_eq!(args.last().map(String::as_str), Some("10.0.0.5"));
    }

    #[test]
    fn test_windows_args_ask_for_name() {
        let args = PingFlavor::Windows.args("10.0.0.5", Duration::from_secs(2));
        assert_eq!(args, vec!["-n", "1", "-a", "-w", "2000", "10.0.0.5"]);
    }

    #[test]
    fn test_parse_native_hostname() {
        let english = "\r\nPinging printer.local [10.0.0.5] with 32 bytes of data:\r\nReply from 10.0.0.5";
        assert_eq!(parse_native_hostname(english, "10.0.0.5").as_deref(), Some("printer.local"));

        let spanish = "Haciendo ping a impresora.lan [10.0.0.5] con 32 bytes de datos:";
        assert_eq!(parse_native_hostname(spanish, "10.0.0.5").as_deref(), Some("impresora.lan"));

        let unresolved = "Pinging 10.0.0.9 with 32 bytes of data:\r\nRequest timed out.";
        assert_eq!(parse_native_hostname(unresolved, "10.0.0.9"), None);
    }

    #[tokio::test]
    async fn test_reachable_host_with_reverse_name() {
        let prober = reverse_dns_prober(Duration::from_secs(2));
        let issued = Utc::now();

        let outcome = prober.probe("10.0.0.5").await;

        assert!(outcome.reachable);
        assert_eq!(outcome.resolved_hostname.as_deref(), Some("printer.local"));
        assert_eq!(outcome.latency_ms, Some(4));
        assert!(outcome.checked_at >= issued);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_host_is_unreachable() {
        let prober = reverse_dns_prober(Duration::from_secs(3));
        let issued = Utc::now();

        let outcome = prober.probe("10.0.0.9").await;

        assert!(!outcome.reachable);
        assert_eq!(outcome.resolved_hostname, None);
        assert_eq!(outcome.latency_ms, None);
        assert!(outcome.checked_at >= issued);
        assert!(outcome.output.as_deref().unwrap_or_default().contains("no reply"));
    }

    #[tokio::test]
    async fn test_probe_respects_shared_deadline() {
        let pinger = ScriptedPinger {
            replies: HashMap::from([("10.0.0.7".to_string(), replied("reply"))]),
        };
        let limit = Duration::from_millis(300);
        let prober = ReverseDnsProber::new(Arc::new(pinger), Arc::new(HangingResolver), limit);
        let issued = Utc::now();

        let outcome = prober.probe("10.0.0.7").await;

        assert!(outcome.reachable);
        assert_eq!(outcome.resolved_hostname, None);
        let slack = chrono::Duration::milliseconds(250);
        assert!(outcome.checked_at >= issued);
        assert!(outcome.checked_at <= issued + chrono::Duration::milliseconds(300) + slack);
    }

    #[tokio::test]
    async fn test_native_prober_reads_name_from_output() {
        let pinger = ScriptedPinger {
            replies: HashMap::from([(
                "10.0.0.5".to_string(),
                replied("Pinging printer.local [10.0.0.5] with 32 bytes of data:"),
            )]),
        };
        let resolver = TableResolver(HashMap::from([("10.0.0.5".parse().unwrap(), "other.local".to_string())]));
        let prober = NativePingProber::new(Arc::new(pinger), Arc::new(resolver), Duration::from_secs(1));

        let outcome = prober.probe("10.0.0.5").await;

        assert!(outcome.reachable);
        assert_eq!(outcome.resolved_hostname.as_deref(), Some("printer.local"));
    }

    #[tokio::test]
    async fn test_native_prober_falls_back_to_reverse_lookup() {
        let pinger = ScriptedPinger {
            replies: HashMap::from([(
                "10.0.0.5".to_string(),
                replied("Pinging 10.0.0.5 with 32 bytes of data:\r\nReply from 10.0.0.5: bytes=32 time=4ms TTL=64"),
            )]),
        };
        let resolver = TableResolver(HashMap::from([("10.0.0.5".parse().unwrap(), "printer.local".to_string())]));
        let prober = NativePingProber::new(Arc::new(pinger), Arc::new(resolver), Duration::from_secs(1));

        let outcome = prober.probe("10.0.0.5").await;

        assert!(outcome.reachable);
        assert_eq!(outcome.resolved_hostname.as_deref(), Some("printer.local"));
    }

    #[tokio::test]
    async fn test_native_prober_names_host_after_failed_spawn() {
        let pinger = SystemPing::with_program(PingFlavor::Windows, "hostwatch-no-such-ping-binary");
        let resolver = TableResolver(HashMap::from([("10.0.0.5".parse().unwrap(), "printer.local".to_string())]));
        let prober = NativePingProber::new(Arc::new(pinger), Arc::new(resolver), Duration::from_secs(1));

        let outcome = prober.probe("10.0.0.5").await;

        assert!(!outcome.reachable);
        assert_eq!(outcome.resolved_hostname.as_deref(), Some("printer.local"));
        assert!(outcome.output.as_deref().unwrap_or_default().contains("failed to run"));
    }

    #[tokio::test]
    async fn test_missing_ping_binary_is_unreachable() {
        let pinger = SystemPing::with_program(PingFlavor::Unix, "hostwatch-no-such-ping-binary");
        let prober =
            ReverseDnsProber::new(Arc::new(pinger), Arc::new(TableResolver(HashMap::new())), Duration::from_secs(1));

        let outcome = prober.probe("10.0.0.9").await;

        assert!(!outcome.reachable);
        assert!(outcome.output.as_deref().unwrap_or_default().contains("failed to run"));
    }
}
