//! User-Friendly Error Formatting
//!
//! Provides user-friendly error messages with troubleshooting hints
//! for common error scenarios.

use std::fmt::Write;

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    // Match on the whole chain so context layers don't hide the cause
    let error_msg = format!("{:#}", error);

    if error_msg.contains("uinput") {
        format_uinput_error(&mut output);
    } else if error_msg.contains("grab") || error_msg.contains("pointing device") {
        format_grab_error(&mut output);
    } else if error_msg.contains("Permission denied") || error_msg.contains("/dev/input") {
        format_permission_error(&mut output);
    } else if error_msg.contains("config") || error_msg.contains("Configuration") {
        format_config_error(&mut output);
    } else {
        format_generic_error(&mut output, &error_msg);
    }

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();

    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run with --verbose for detailed logs: lamco-pointerd -vv"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Try without touching devices: lamco-pointerd --dry-run"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();

    output
}

fn format_uinput_error(output: &mut String) {
    writeln!(output, "Virtual Device Error (uinput)").ok();
    writeln!(output).ok();
    writeln!(output, "Could not create the virtual pointer used for output.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. uinput module not loaded").ok();
    writeln!(output, "     → Run: sudo modprobe uinput").ok();
    writeln!(output, "     → Persist: echo uinput | sudo tee /etc/modules-load.d/uinput.conf").ok();
    writeln!(output).ok();
    writeln!(output, "  2. No write access to /dev/uinput").ok();
    writeln!(output, "     → Check: ls -l /dev/uinput").ok();
    writeln!(
        output,
        "     → Add a udev rule: KERNEL==\"uinput\", GROUP=\"input\", MODE=\"0660\""
    )
    .ok();
}

fn format_grab_error(output: &mut String) {
    writeln!(output, "Device Grab Error").ok();
    writeln!(output).ok();
    writeln!(output, "No pointing device could be taken over exclusively.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Another remapper already grabbed the device").ok();
    writeln!(output, "     → Stop other tools (input-remapper, evsieve, ...)").ok();
    writeln!(output).ok();
    writeln!(output, "  2. --device points at the wrong node").ok();
    writeln!(output, "     → List devices: cat /proc/bus/input/devices").ok();
    writeln!(output, "     → Or: ls -l /dev/input/by-id/").ok();
}

fn format_permission_error(output: &mut String) {
    writeln!(output, "Input Device Permission Error").ok();
    writeln!(output).ok();
    writeln!(output, "Could not open input devices under /dev/input.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. User is not in the input group").ok();
    writeln!(output, "     → Run: sudo usermod -aG input $USER").ok();
    writeln!(output, "     → Log out and log back in").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Running inside a sandbox without device access").ok();
    writeln!(output, "     → Run the daemon as a system service instead").ok();
}

fn format_config_error(output: &mut String) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with configuration file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Invalid TOML syntax").ok();
    writeln!(output, "     → Check for typos, missing quotes, etc.").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Malformed acceleration table").ok();
    writeln!(output, "     → At least 2 [speed, gain] samples").ok();
    writeln!(output, "     → Speeds strictly increasing, gains non-decreasing").ok();
    writeln!(output, "     → degree must be less than the number of samples").ok();
    writeln!(output).ok();
    writeln!(output, "  3. Ambiguous mappings").ok();
    writeln!(
        output,
        "     → Two mappings with the same trigger and equally many modifiers"
    )
    .ok();
    writeln!(
        output,
        "       need a third mapping covering both modifier sets"
    )
    .ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Daemon Error").ok();
    writeln!(output).ok();
    writeln!(output, "An error occurred while running the daemon.").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
    writeln!(output).ok();
    writeln!(output, "Troubleshooting:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Check device access:").ok();
    writeln!(output, "     → ls -l /dev/input/event* /dev/uinput").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Check the kernel log for input errors:").ok();
    writeln!(output, "     → journalctl -k | grep -i input").ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_user_error() {
        let error = anyhow::anyhow!("Event sink error: failed to create uinput device");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("ERROR"));
        assert!(formatted.contains("modprobe uinput"));
    }

    #[test]
    fn test_config_error_through_context() {
        let error = anyhow::anyhow!("Invalid configuration: mouse: degree 4")
            .context("Failed to load config file");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("Configuration Error"));
        assert!(formatted.contains("degree 4"));
    }

    #[test]
    fn test_grab_error_formatting() {
        let error = anyhow::anyhow!("Event source error: no pointing device could be grabbed");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("Device Grab Error"));
    }
}
