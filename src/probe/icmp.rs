use std::io::{ErrorKind, Read};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::debug;

use super::{ProbeOutcome, Prober};

const ICMPV4_ECHO_REPLY: u8 = 0;
const ICMPV4_DEST_UNREACHABLE: u8 = 3;
const ICMPV4_ECHO_REQUEST: u8 = 8;
const ICMPV4_TIME_EXCEEDED: u8 = 11;
const ICMPV4_PARAMETER_PROBLEM: u8 = 12;

const ICMPV6_DEST_UNREACHABLE: u8 = 1;
const ICMPV6_PACKET_TOO_BIG: u8 = 2;
const ICMPV6_TIME_EXCEEDED: u8 = 3;
const ICMPV6_PARAMETER_PROBLEM: u8 = 4;
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

const ICMP_HEADER_LEN: usize = 8;
const IPV6_HEADER_LEN: usize = 40;

/// How one received datagram relates to our echo request
#[derive(Debug, Clone, PartialEq)]
enum Reply {
    Echo,
    Error(String),
    Unrelated,
}

/// ICMP echo (ping) prober for IPv4 and IPv6
pub struct IcmpProber {
    timeout_ms: u64,
    count: u16,
}

impl IcmpProber {
    pub fn new() -> Self {
        Self {
            timeout_ms: 1000,
            count: 1,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms.max(1);
        self
    }

    pub fn with_count(mut self, count: u16) -> Self {
        self.count = count.max(1);
        self
    }

    /// Build an echo request. ICMPv6 checksums are filled in by the kernel.
    fn build_echo_request(ipv6: bool, identifier: u16, sequence: u16) -> Vec<u8> {
        let mut packet = vec![0u8; ICMP_HEADER_LEN];

        packet[0] = if ipv6 {
            ICMPV6_ECHO_REQUEST
        } else {
            ICMPV4_ECHO_REQUEST
        };
        packet[4..6].copy_from_slice(&identifier.to_be_bytes());
        packet[6..8].copy_from_slice(&sequence.to_be_bytes());

        if !ipv6 {
            let checksum = Self::calculate_checksum(&packet);
            packet[2..4].copy_from_slice(&checksum.to_be_bytes());
        }

        packet
    }

    /// Calculate ICMP checksum
    fn calculate_checksum(data: &[u8]) -> u16 {
        let mut sum: u32 = 0;

        for chunk in data.chunks(2) {
            let word = match chunk {
                [hi, lo] => (u32::from(*hi) << 8) | u32::from(*lo),
                [hi] => u32::from(*hi) << 8,
                _ => 0,
            };
            sum = sum.wrapping_add(word);
        }

        while (sum >> 16) != 0 {
            sum = (sum & 0xffff) + (sum >> 16);
        }

        !(sum as u16)
    }

    /// Prefer an unprivileged datagram socket and fall back to a raw one.
    /// Returns whether the socket is raw.
    fn open_socket(ip: IpAddr) -> std::io::Result<(Socket, bool)> {
        let (domain, protocol) = match ip {
            IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4),
            IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6),
        };

        match Socket::new(domain, Type::DGRAM, Some(protocol)) {
            Ok(socket) => {
                if let Err(e) = Self::enable_error_queue(&socket, ip.is_ipv6()) {
                    debug!(error = %e, "Could not enable ICMP error reporting");
                }
                Ok((socket, false))
            }
            Err(e) => {
                debug!(error = %e, "Datagram ICMP socket unavailable, trying raw socket");
                Socket::new(domain, Type::RAW, Some(protocol)).map(|socket| (socket, true))
            }
        }
    }

    /// Datagram ICMP sockets only report unreachable destinations when the
    /// kernel is asked to queue ICMP errors; `read` then fails with
    /// `EHOSTUNREACH`/`ENETUNREACH` instead of staying silent.
    #[cfg(target_os = "linux")]
    fn enable_error_queue(socket: &Socket, ipv6: bool) -> std::io::Result<()> {
        use std::os::fd::AsRawFd;

        let (level, name) = if ipv6 {
            (libc::IPPROTO_IPV6, libc::IPV6_RECVERR)
        } else {
            (libc::IPPROTO_IP, libc::IP_RECVERR)
        };
        let enable: libc::c_int = 1;
        // SAFETY: the fd stays owned by `socket` and `enable` outlives the call
        let rc = unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                level,
                name,
                (&enable as *const libc::c_int).cast(),
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn enable_error_queue(_socket: &Socket, _ipv6: bool) -> std::io::Result<()> {
        Ok(())
    }

    /// Reason for a failed read, or `None` when the read just timed out
    fn socket_error_reason(e: &std::io::Error) -> Option<String> {
        match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => None,
            ErrorKind::NetworkUnreachable => Some("Destination network unreachable".to_string()),
            ErrorKind::HostUnreachable => Some("Destination host unreachable".to_string()),
            _ => Some(e.to_string()),
        }
    }

    /// Classify a received datagram.
    ///
    /// Datagram sockets rewrite the identifier, so it is only checked when
    /// `identifier` is given (raw sockets).
    fn classify_reply(
        data: &[u8],
        ipv6: bool,
        identifier: Option<u16>,
        sequence: u16,
    ) -> Reply {
        // Raw IPv4 sockets (and some datagram implementations) include the IP header
        let icmp = if !ipv6 && data.first().is_some_and(|b| b >> 4 == 4) {
            let header_len = usize::from(data[0] & 0x0f) * 4;
            data.get(header_len..).unwrap_or_default()
        } else {
            data
        };

        if icmp.len() < ICMP_HEADER_LEN {
            return Reply::Unrelated;
        }

        let (icmp_type, code) = (icmp[0], icmp[1]);
        let echo_reply = if ipv6 {
            ICMPV6_ECHO_REPLY
        } else {
            ICMPV4_ECHO_REPLY
        };

        if icmp_type == echo_reply {
            return if Self::matches_request(&icmp[4..8], identifier, sequence) {
                Reply::Echo
            } else {
                Reply::Unrelated
            };
        }

        let Some(description) = Self::describe_error(ipv6, icmp_type, code) else {
            return Reply::Unrelated;
        };

        // Error messages quote the offending datagram after their own header
        let quoted = &icmp[ICMP_HEADER_LEN..];
        let quoted_header_len = if ipv6 {
            IPV6_HEADER_LEN
        } else {
            quoted
                .first()
                .map_or(0, |b| usize::from(b & 0x0f) * 4)
        };
        match quoted.get(quoted_header_len..quoted_header_len + ICMP_HEADER_LEN) {
            Some(request) if !Self::matches_request(&request[4..8], identifier, sequence) => {
                Reply::Unrelated
            }
            _ => Reply::Error(description),
        }
    }

    fn matches_request(id_and_seq: &[u8], identifier: Option<u16>, sequence: u16) -> bool {
        let id = u16::from_be_bytes([id_and_seq[0], id_and_seq[1]]);
        let seq = u16::from_be_bytes([id_and_seq[2], id_and_seq[3]]);
        seq == sequence && identifier.is_none_or(|expected| expected == id)
    }

    fn describe_error(ipv6: bool, icmp_type: u8, code: u8) -> Option<String> {
        let description = match (ipv6, icmp_type) {
            (false, ICMPV4_DEST_UNREACHABLE) => match code {
                0 => "Destination network unreachable".to_string(),
                1 => "Destination host unreachable".to_string(),
                3 => "Destination port unreachable".to_string(),
                13 => "Communication administratively prohibited".to_string(),
                _ => format!("Destination unreachable (code {})", code),
            },
            (false, ICMPV4_TIME_EXCEEDED) => "Time to live exceeded".to_string(),
            (false, ICMPV4_PARAMETER_PROBLEM) => "Parameter problem".to_string(),
            (true, ICMPV6_DEST_UNREACHABLE) => match code {
                0 => "No route to destination".to_string(),
                1 => "Communication administratively prohibited".to_string(),
                3 => "Destination address unreachable".to_string(),
                _ => format!("Destination unreachable (code {})", code),
            },
            (true, ICMPV6_PACKET_TOO_BIG) => "Packet too big".to_string(),
            (true, ICMPV6_TIME_EXCEEDED) => "Hop limit exceeded".to_string(),
            (true, ICMPV6_PARAMETER_PROBLEM) => "Parameter problem".to_string(),
            _ => return None,
        };
        Some(description)
    }

    /// Turn what was seen into the final outcome. Silence is a timeout; an
    /// error reply without any echo reply is a failure.
    fn summarize(ip: IpAddr, rtts: &[f64], error_reply: Option<String>) -> ProbeOutcome {
        if !rtts.is_empty() {
            let avg = rtts.iter().sum::<f64>() / rtts.len() as f64;
            return ProbeOutcome::success(ip, avg);
        }
        match error_reply {
            Some(reason) => ProbeOutcome::failure(format!("Packet loss: {}", reason)),
            None => ProbeOutcome::timeout(),
        }
    }

    fn ping(&self, ip: IpAddr) -> std::io::Result<ProbeOutcome> {
        let (socket, raw) = Self::open_socket(ip)?;
        let ipv6 = ip.is_ipv6();
        let identifier = std::process::id() as u16;
        let expected_id = raw.then_some(identifier);
        let target = SockAddr::from(SocketAddr::new(ip, 0));

        let deadline = Instant::now() + self.timeout();
        let mut rtts = Vec::new();
        let mut error_reply = None;
        let mut buffer = [0u8; 1024];

        'packets: for sequence in 0..self.count {
            let start = Instant::now();
            socket.send_to(&Self::build_echo_request(ipv6, identifier, sequence), &target)?;

            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break 'packets;
                }
                socket.set_read_timeout(Some(remaining))?;

                match (&socket).read(&mut buffer) {
                    Ok(len) => match Self::classify_reply(&buffer[..len], ipv6, expected_id, sequence)
                    {
                        Reply::Echo => {
                            rtts.push(start.elapsed().as_secs_f64() * 1000.0);
                            break;
                        }
                        Reply::Error(reason) => {
                            error_reply = Some(reason);
                            break;
                        }
                        Reply::Unrelated => {}
                    },
                    // Datagram sockets surface ICMP errors as socket errors
                    Err(e) => match Self::socket_error_reason(&e) {
                        Some(reason) => {
                            error_reply = Some(reason);
                            break;
                        }
                        None => break 'packets,
                    },
                }
            }
        }

        Ok(Self::summarize(ip, &rtts, error_reply))
    }
}

impl Default for IcmpProber {
    fn default() -> Self {
        Self::new()
    }
}

impl Prober for IcmpProber {
    fn probe(&self, ip: IpAddr) -> ProbeOutcome {
        self.ping(ip)
            .unwrap_or_else(|e| ProbeOutcome::failure(format!("Ping error: {}", e)))
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
