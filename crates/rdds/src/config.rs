// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Domain configuration.
//!
//! A domain is configured either through a [`DomainConfig`] initializer
//! record or through an XML fragment covering the same keys. Supplying both
//! a non-default record and an XML fragment is a configuration error.
//! Unknown XML elements are rejected with `BadParameter` rather than
//! ignored, so typos surface at startup.
//!
//! The live per-domain snapshot sits behind an `ArcSwap`: readers take a
//! cheap consistent snapshot, reloads swap the whole record.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::retcode::{ReturnCode, Result};
use crate::rt::thread::{SchedClass, ThreadAttributes};
use crate::time::Duration;

/// How entities get their default names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityNamingMode {
    /// Unnamed entities keep an empty name.
    #[default]
    Empty,
    /// Unnamed entities get a generated two-word name, deterministic per
    /// participant seed.
    Fancy,
}

/// How participant indexes are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParticipantIndexStrategy {
    #[default]
    Auto,
    None,
    Fixed(u32),
}

/// Retransmit-merging aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetransmitMerging {
    Never,
    #[default]
    Adaptive,
    Always,
}

/// Per-thread scheduling overrides, keyed by thread name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadProperties {
    pub name: String,
    pub class: SchedClass,
    pub priority: Option<i32>,
    pub stack_size: Option<usize>,
}

impl ThreadProperties {
    #[must_use]
    pub fn attributes(&self) -> ThreadAttributes {
        ThreadAttributes {
            class: self.class,
            priority: self.priority,
            stack_size: self.stack_size,
        }
    }
}

/// Domain configuration record.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainConfig {
    pub domain_id: u32,
    pub domain_tag: String,
    /// Category bitmask for trace logging.
    pub tracing_mask: u32,
    pub trace_file: Option<String>,
    pub allow_multicast: bool,
    pub participant_index: ParticipantIndexStrategy,
    pub spdp_interval: Duration,
    pub lease_duration: Duration,
    pub heartbeat_interval_min: Duration,
    pub heartbeat_interval_max: Duration,
    pub retransmit_merging: RetransmitMerging,
    pub retransmit_merging_period: Duration,
    pub squash_participants: bool,
    pub liveliness_monitoring: bool,
    pub liveliness_monitoring_interval: Duration,
    pub multiple_receive_threads: bool,
    pub delivery_queue_size: usize,
    pub fragment_size: usize,
    pub max_message_size: usize,
    pub max_rexmit_burst_size: usize,
    pub whc_low_watermark: usize,
    pub whc_high_watermark: usize,
    pub whc_init_high_watermark: usize,
    /// Ceiling on one serialized sample; zero disables the check.
    pub max_sample_size: usize,
    /// Coalesce writes until an explicit flush.
    pub whc_batch: bool,
    pub multicast_ttl: u32,
    pub socket_send_buffer: usize,
    pub socket_receive_buffer: usize,
    pub entity_naming_mode: EntityNamingMode,
    /// Seed for the fancy-name generator; zero draws from the OS.
    pub entity_naming_seed: u64,
    pub threads: Vec<ThreadProperties>,
}

impl Default for DomainConfig {
    fn default() -> Self {
        DomainConfig {
            domain_id: 0,
            domain_tag: String::new(),
            tracing_mask: 0,
            trace_file: None,
            allow_multicast: true,
            participant_index: ParticipantIndexStrategy::Auto,
            spdp_interval: Duration::from_secs(30),
            lease_duration: Duration::from_secs(10),
            heartbeat_interval_min: Duration::from_millis(5),
            heartbeat_interval_max: Duration::from_secs(8),
            retransmit_merging: RetransmitMerging::Adaptive,
            retransmit_merging_period: Duration::from_millis(5),
            squash_participants: false,
            liveliness_monitoring: false,
            liveliness_monitoring_interval: Duration::from_secs(1),
            multiple_receive_threads: false,
            delivery_queue_size: 256,
            fragment_size: 1344,
            max_message_size: 14720,
            max_rexmit_burst_size: 1_048_576,
            whc_low_watermark: 1024,
            whc_high_watermark: 512 * 1024,
            whc_init_high_watermark: 30 * 1024,
            max_sample_size: 0,
            whc_batch: false,
            multicast_ttl: 32,
            socket_send_buffer: 0,
            socket_receive_buffer: 0,
            entity_naming_mode: EntityNamingMode::Empty,
            entity_naming_seed: 0,
            threads: Vec::new(),
        }
    }
}

impl DomainConfig {
    /// Basic range checks.
    pub fn validate(&self) -> Result<()> {
        if self.fragment_size == 0 || self.max_message_size < self.fragment_size {
            return Err(ReturnCode::BadParameter);
        }
        if self.whc_low_watermark > self.whc_high_watermark {
            return Err(ReturnCode::BadParameter);
        }
        for d in [
            self.spdp_interval,
            self.lease_duration,
            self.heartbeat_interval_min,
            self.heartbeat_interval_max,
            self.retransmit_merging_period,
            self.liveliness_monitoring_interval,
        ] {
            if d.is_negative() {
                return Err(ReturnCode::BadParameter);
            }
        }
        if self.heartbeat_interval_min > self.heartbeat_interval_max {
            return Err(ReturnCode::BadParameter);
        }
        Ok(())
    }

    /// Scheduling attributes for a named internal thread.
    #[must_use]
    pub fn thread_attributes(&self, name: &str) -> ThreadAttributes {
        self.threads
            .iter()
            .find(|t| t.name == name)
            .map_or_else(ThreadAttributes::default, ThreadProperties::attributes)
    }
}

/// Hot-swappable configuration holder.
#[derive(Debug)]
pub struct ConfigStore {
    current: ArcSwap<DomainConfig>,
}

impl ConfigStore {
    #[must_use]
    pub fn new(config: DomainConfig) -> Self {
        ConfigStore {
            current: ArcSwap::from_pointee(config),
        }
    }

    /// Consistent snapshot; never blocks writers.
    #[must_use]
    pub fn snapshot(&self) -> Arc<DomainConfig> {
        self.current.load_full()
    }

    pub fn reload(&self, config: DomainConfig) -> Result<()> {
        config.validate()?;
        self.current.store(Arc::new(config));
        Ok(())
    }
}

/// Resolve the effective configuration from an optional record and an
/// optional XML fragment. Both at once is an error.
pub fn resolve_config(
    record: Option<DomainConfig>,
    xml: Option<&str>,
) -> Result<DomainConfig> {
    match (record, xml) {
        (Some(record), None) => {
            record.validate()?;
            Ok(record)
        }
        (None, Some(xml)) => {
            let cfg = parse_xml(xml)?;
            cfg.validate()?;
            Ok(cfg)
        }
        (None, None) => Ok(DomainConfig::default()),
        (Some(record), Some(_)) if record == DomainConfig::default() => {
            // A default record carries no information; the XML wins.
            let cfg = parse_xml(xml.unwrap_or(""))?;
            cfg.validate()?;
            Ok(cfg)
        }
        (Some(_), Some(_)) => Err(ReturnCode::BadParameter),
    }
}

/// Resolve configuration from an XML file on disk.
pub fn resolve_config_from_file(path: &std::path::Path) -> Result<DomainConfig> {
    let xml = std::fs::read_to_string(path).map_err(|e| {
        log::warn!("[config] cannot read {}: {}", path.display(), e);
        ReturnCode::BadParameter
    })?;
    resolve_config(None, Some(&xml))
}

#[cfg(feature = "xml-config")]
fn parse_xml(xml: &str) -> Result<DomainConfig> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| {
        log::warn!("[config] XML parse error: {}", e);
        ReturnCode::BadParameter
    })?;
    let root = doc.root_element();
    if root.tag_name().name() != "Domain" {
        return Err(ReturnCode::BadParameter);
    }

    let mut cfg = DomainConfig::default();
    if let Some(id) = root.attribute("id") {
        if id != "any" {
            cfg.domain_id = id.parse().map_err(|_| ReturnCode::BadParameter)?;
        }
    }

    for child in root.children().filter(roxmltree::Node::is_element) {
        let text = child.text().unwrap_or("").trim();
        match child.tag_name().name() {
            "Tag" => cfg.domain_tag = text.to_string(),
            "TracingMask" => cfg.tracing_mask = parse_num(text)?,
            "TraceFile" => cfg.trace_file = Some(text.to_string()),
            "AllowMulticast" => cfg.allow_multicast = parse_bool(text)?,
            "ParticipantIndex" => {
                cfg.participant_index = match text {
                    "auto" => ParticipantIndexStrategy::Auto,
                    "none" => ParticipantIndexStrategy::None,
                    n => ParticipantIndexStrategy::Fixed(
                        n.parse().map_err(|_| ReturnCode::BadParameter)?,
                    ),
                };
            }
            "SPDPInterval" => cfg.spdp_interval = parse_duration(text)?,
            "LeaseDuration" => cfg.lease_duration = parse_duration(text)?,
            "HeartbeatIntervalMin" => cfg.heartbeat_interval_min = parse_duration(text)?,
            "HeartbeatIntervalMax" => cfg.heartbeat_interval_max = parse_duration(text)?,
            "RetransmitMerging" => {
                cfg.retransmit_merging = match text {
                    "never" => RetransmitMerging::Never,
                    "adaptive" => RetransmitMerging::Adaptive,
                    "always" => RetransmitMerging::Always,
                    _ => return Err(ReturnCode::BadParameter),
                };
            }
            "RetransmitMergingPeriod" => cfg.retransmit_merging_period = parse_duration(text)?,
            "SquashParticipants" => cfg.squash_participants = parse_bool(text)?,
            "LivelinessMonitoring" => cfg.liveliness_monitoring = parse_bool(text)?,
            "LivelinessMonitoringInterval" => {
                cfg.liveliness_monitoring_interval = parse_duration(text)?;
            }
            "MultipleReceiveThreads" => cfg.multiple_receive_threads = parse_bool(text)?,
            "DeliveryQueueSize" => cfg.delivery_queue_size = parse_num(text)? as usize,
            "FragmentSize" => cfg.fragment_size = parse_num(text)? as usize,
            "MaxMessageSize" => cfg.max_message_size = parse_num(text)? as usize,
            "MaxRexmitBurstSize" => cfg.max_rexmit_burst_size = parse_num(text)? as usize,
            "WhcLowWatermark" => cfg.whc_low_watermark = parse_num(text)? as usize,
            "WhcHighWatermark" => cfg.whc_high_watermark = parse_num(text)? as usize,
            "WhcInitHighWatermark" => cfg.whc_init_high_watermark = parse_num(text)? as usize,
            "MaxSampleSize" => cfg.max_sample_size = parse_num(text)? as usize,
            "WhcBatch" => cfg.whc_batch = parse_bool(text)?,
            "MulticastTtl" => cfg.multicast_ttl = parse_num(text)?,
            "SocketSendBuffer" => cfg.socket_send_buffer = parse_num(text)? as usize,
            "SocketReceiveBuffer" => cfg.socket_receive_buffer = parse_num(text)? as usize,
            "EntityNaming" => {
                cfg.entity_naming_mode = match text {
                    "empty" => EntityNamingMode::Empty,
                    "fancy" => EntityNamingMode::Fancy,
                    _ => return Err(ReturnCode::BadParameter),
                };
            }
            "EntityNamingSeed" => cfg.entity_naming_seed = parse_num(text)? as u64,
            "Threads" => {
                for thread in child.children().filter(roxmltree::Node::is_element) {
                    if thread.tag_name().name() != "Thread" {
                        return Err(ReturnCode::BadParameter);
                    }
                    let name = thread
                        .attribute("name")
                        .ok_or(ReturnCode::BadParameter)?
                        .to_string();
                    let mut props = ThreadProperties {
                        name,
                        ..Default::default()
                    };
                    if let Some(class) = thread.attribute("class") {
                        props.class = match class {
                            "timeshare" => SchedClass::TimeShare,
                            "realtime" => SchedClass::RealTime,
                            _ => return Err(ReturnCode::BadParameter),
                        };
                    }
                    if let Some(prio) = thread.attribute("priority") {
                        props.priority =
                            Some(prio.parse().map_err(|_| ReturnCode::BadParameter)?);
                    }
                    if let Some(stack) = thread.attribute("stack") {
                        props.stack_size =
                            Some(stack.parse().map_err(|_| ReturnCode::BadParameter)?);
                    }
                    cfg.threads.push(props);
                }
            }
            unknown => {
                log::warn!("[config] unknown configuration element '{}'", unknown);
                return Err(ReturnCode::BadParameter);
            }
        }
    }
    Ok(cfg)
}

#[cfg(not(feature = "xml-config"))]
fn parse_xml(_xml: &str) -> Result<DomainConfig> {
    Err(ReturnCode::Unsupported)
}

#[cfg(feature = "xml-config")]
fn parse_bool(text: &str) -> Result<bool> {
    match text {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ReturnCode::BadParameter),
    }
}

#[cfg(feature = "xml-config")]
fn parse_num(text: &str) -> Result<u32> {
    text.parse().map_err(|_| ReturnCode::BadParameter)
}

/// Durations are given as `<number><unit>` with units `ns`, `us`, `ms`, `s`,
/// or the literal `inf`.
#[cfg(feature = "xml-config")]
fn parse_duration(text: &str) -> Result<Duration> {
    if text == "inf" {
        return Ok(Duration::INFINITY);
    }
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .ok_or(ReturnCode::BadParameter)?;
    let (num, unit) = text.split_at(split);
    let value: i64 = num.parse().map_err(|_| ReturnCode::BadParameter)?;
    match unit {
        "ns" => Ok(Duration::from_nanos(value)),
        "us" => Ok(Duration::from_micros(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(ReturnCode::BadParameter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(DomainConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_watermark_ordering() {
        let cfg = DomainConfig {
            whc_low_watermark: 100,
            whc_high_watermark: 10,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ReturnCode::BadParameter));
    }

    #[test]
    fn test_resolve_record_only() {
        let record = DomainConfig {
            domain_id: 7,
            ..Default::default()
        };
        let cfg = resolve_config(Some(record), None).expect("record config");
        assert_eq!(cfg.domain_id, 7);
    }

    #[test]
    fn test_resolve_both_is_error() {
        let record = DomainConfig {
            domain_id: 7,
            ..Default::default()
        };
        assert_eq!(
            resolve_config(Some(record), Some("<Domain/>")),
            Err(ReturnCode::BadParameter)
        );
    }

    #[test]
    fn test_config_store_swap() {
        let store = ConfigStore::new(DomainConfig::default());
        assert_eq!(store.snapshot().domain_id, 0);
        store
            .reload(DomainConfig {
                domain_id: 3,
                ..Default::default()
            })
            .expect("reload");
        assert_eq!(store.snapshot().domain_id, 3);
    }

    #[cfg(feature = "xml-config")]
    mod xml {
        use super::super::*;

        #[test]
        fn test_parse_basic_fragment() {
            let cfg = resolve_config(
                None,
                Some(
                    r#"<Domain id="2">
                         <AllowMulticast>false</AllowMulticast>
                         <LeaseDuration>5s</LeaseDuration>
                         <MaxSampleSize>65536</MaxSampleSize>
                         <WhcBatch>true</WhcBatch>
                         <EntityNaming>fancy</EntityNaming>
                         <EntityNamingSeed>42</EntityNamingSeed>
                       </Domain>"#,
                ),
            )
            .expect("parse");
            assert_eq!(cfg.domain_id, 2);
            assert!(!cfg.allow_multicast);
            assert_eq!(cfg.lease_duration, Duration::from_secs(5));
            assert_eq!(cfg.max_sample_size, 65536);
            assert!(cfg.whc_batch);
            assert_eq!(cfg.entity_naming_mode, EntityNamingMode::Fancy);
            assert_eq!(cfg.entity_naming_seed, 42);
        }

        #[test]
        fn test_unknown_key_rejected() {
            assert_eq!(
                resolve_config(None, Some("<Domain><NoSuchKey>1</NoSuchKey></Domain>")),
                Err(ReturnCode::BadParameter)
            );
        }

        #[test]
        fn test_bad_root_rejected() {
            assert_eq!(
                resolve_config(None, Some("<Runtime/>")),
                Err(ReturnCode::BadParameter)
            );
        }

        #[test]
        fn test_thread_properties() {
            let cfg = resolve_config(
                None,
                Some(
                    r#"<Domain>
                         <Threads>
                           <Thread name="delivery" class="realtime" priority="10" stack="65536"/>
                         </Threads>
                       </Domain>"#,
                ),
            )
            .expect("parse");
            assert_eq!(cfg.threads.len(), 1);
            let attrs = cfg.thread_attributes("delivery");
            assert_eq!(attrs.class, SchedClass::RealTime);
            assert_eq!(attrs.priority, Some(10));
            assert_eq!(attrs.stack_size, Some(65536));
        }

        #[test]
        fn test_config_from_file() {
            use std::io::Write;
            let mut file = tempfile::NamedTempFile::new().expect("tempfile");
            write!(
                file,
                r#"<Domain id="9"><MulticastTtl>64</MulticastTtl></Domain>"#
            )
            .expect("write");
            let cfg = resolve_config_from_file(file.path()).expect("parse file");
            assert_eq!(cfg.domain_id, 9);
            assert_eq!(cfg.multicast_ttl, 64);

            assert_eq!(
                resolve_config_from_file(std::path::Path::new("/no/such/config.xml")),
                Err(ReturnCode::BadParameter)
            );
        }

        #[test]
        fn test_duration_units() {
            assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
            assert_eq!(parse_duration("5us").unwrap(), Duration::from_micros(5));
            assert_eq!(parse_duration("7ns").unwrap(), Duration::from_nanos(7));
            assert!(parse_duration("inf").unwrap().is_infinite());
            assert!(parse_duration("10m").is_err());
            assert!(parse_duration("xyz").is_err());
        }
    }
}
