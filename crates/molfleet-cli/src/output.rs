//! Text and JSON rendering of command results

use color_eyre::Result;
use serde::Serialize;

use molfleet_api::FleetEvent;
use molfleet_core::{ControlReport, FleetSnapshot, HostRecord, ServiceStatus, StagingState};

/// Print `value` as pretty JSON
pub fn json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

fn host_line(record: &HostRecord) -> String {
    let mut line = format!(
        "{:<16} {:<16} {:<10} {:<9}",
        or_dash(&record.primary_ip),
        record.hostname.as_deref().unwrap_or("-"),
        or_dash(&record.version),
        record.service_state.to_string(),
    );
    if record.updating {
        line.push_str(" updating");
    }
    let others: Vec<&str> = record
        .known_ips
        .iter()
        .map(String::as_str)
        .filter(|ip| *ip != record.primary_ip)
        .collect();
    if !others.is_empty() {
        line.push_str(&format!(" also {}", others.join(", ")));
    }
    line
}

pub fn snapshot(snapshot: &FleetSnapshot) {
    println!("{:<16} {:<16} {:<10} {:<9}", "ADDRESS", "HOSTNAME", "VERSION", "SERVICE");
    println!("{} (self)", host_line(&snapshot.self_host));
    for host in &snapshot.hosts {
        println!("{}", host_line(host));
    }
    if snapshot.hosts.is_empty() {
        println!("no other nodes answered");
    }
}

pub fn host(record: &HostRecord) {
    println!("{}", host_line(record));
}

pub fn staging(state: &StagingState, last_uploaded: Option<&str>) {
    if state.is_empty() {
        println!("staging is empty");
    } else {
        println!("staged: {}", state.staged_versions.join(", "));
    }
    if let Some(current) = &state.current_version {
        println!("running: {current}");
    }
    match (&state.apply_version, state.can_apply_self) {
        (Some(version), true) => println!("this node can apply {version}"),
        _ => println!("nothing to apply on this node"),
    }
    if let Some(version) = last_uploaded {
        println!("last upload: {version}");
    }
}

pub fn status(status: &ServiceStatus) {
    let controls = status.state.controls();
    println!(
        "{} ({})",
        status.active_line.as_deref().unwrap_or(status.state.summary()),
        status.state
    );
    println!(
        "start {}, stop {}",
        if controls.start_enabled { "available" } else { "unavailable" },
        if controls.stop_enabled { "available" } else { "unavailable" },
    );
}

pub fn control(report: &ControlReport) {
    match &report.acknowledgement {
        Ok(ack) if !ack.trim().is_empty() => println!("{}", ack.trim()),
        Ok(_) => {}
        Err(message) => eprintln!("control request failed: {message}"),
    }
    status(&report.status);
}

/// One-line progress report on stderr
pub fn event(event: &FleetEvent) {
    match event {
        FleetEvent::HostDiscovered { host } => eprintln!("found {host}"),
        FleetEvent::RolloutStateChanged { target, from, to } => {
            eprintln!("{target}: {from} -> {to}");
        }
        FleetEvent::RolloutMessage { target, message } => eprintln!("{target}: {message}"),
        FleetEvent::ReloadCountdown { remaining } => eprintln!("reloading in {remaining}s"),
        FleetEvent::ActivityLog { output, .. } => {
            for line in output.lines() {
                eprintln!("| {line}");
            }
        }
        FleetEvent::DiscoveryFailed { message } => eprintln!("discovery failed: {message}"),
        _ => {}
    }
}
