use std::fmt::Write;

use crate::telemetry::MonitorState;

fn on_off(active: bool, on: &'static str, off: &'static str) -> &'static str {
    if active { on } else { off }
}

/// Plain-text status panel, one field per line.
pub fn render_status(monitor: &MonitorState) -> String {
    let state = monitor.engine.state();
    let modules = &monitor.modules;
    let mut out = String::new();

    let _ = writeln!(out, "System: {}", on_off(state.is_running, "ACTIVE", "STANDBY"));
    let _ = writeln!(out, "Battery: {:.1}%", state.battery_level);
    let _ = writeln!(
        out,
        "Speed: {:.1} km/h (limit {} km/h) [{}]",
        state.current_speed,
        state.speed_limit,
        state.speed_status().label()
    );
    let _ = writeln!(
        out,
        "Obstacle: {}",
        on_off(state.obstacle_detected, "OBSTACLE DETECTED", "CLEAR PATH")
    );
    let _ = writeln!(out, "Motor: {}", on_off(state.is_running, "AUTO", "MANUAL"));
    let _ = writeln!(out, "Speed control: {:.0}%", state.speed_ratio_percent());
    for alert in &state.alerts {
        let _ = writeln!(out, "Alert: {alert}");
    }
    let _ = writeln!(out, "Audio alerts: {}", on_off(monitor.audio_alerts, "ON", "OFF"));
    let _ = writeln!(
        out,
        "Module 1 Speed Measurement: {}",
        on_off(modules.speed_measurement, "ONLINE", "OFFLINE")
    );
    let _ = writeln!(
        out,
        "Module 2 Detection & Alerts: {}",
        on_off(modules.detection_alerts, "MONITORING", "STANDBY")
    );
    let _ = writeln!(
        out,
        "Module 3 Speed Control: {}",
        on_off(modules.speed_control, "CONTROL", "MANUAL")
    );
    let _ = writeln!(
        out,
        "Store: {} ({} samples)",
        on_off(monitor.store_connected, "CONNECTED", "OFFLINE"),
        monitor.history_len()
    );
    if let Some((error, at)) = &monitor.store_error {
        let _ = writeln!(out, "Store error: {error} ({}s ago)", at.elapsed().as_secs());
    }
    out
}
