//! Integration tests for confirmation gating
//!
//! Every tool call the model can produce must come out of `assess` with the
//! right severity before it reaches the user.

use ajan::parser::parse_reply;
use ajan::safety::{assess, SafetyError, Severity};

fn shell_reply(command: &str) -> String {
    serde_json::json!({
        "type": "tool_call",
        "tool_call": {
            "tool_name": "run_shell_command",
            "params": { "command": command }
        }
    })
    .to_string()
}

/// Commands that must never be auto-approved
fn critical_scenarios() -> Vec<(&'static str, &'static str)> {
    vec![
        ("sudo apt-get install nginx", "Privilege escalation"),
        ("cd / && sudo rm -rf var", "Sudo after a chain"),
        ("echo 'x' | sudo tee /etc/hosts", "Sudo in a pipe"),
        ("rm -rf /", "Root wipe"),
        ("rm -rf /*", "Root glob wipe"),
        ("mkfs.ext4 /dev/sdb1", "Filesystem creation"),
        ("dd if=/dev/zero of=/dev/sda bs=1M", "Raw disk overwrite"),
        ("cat junk > /dev/sda", "Redirect onto a disk"),
        (":(){ :|:& };:", "Fork bomb"),
        ("/usr/bin/sudo apt remove libc6", "Sudo by absolute path"),
        ("bash -c 'sudo reboot'", "Sudo in a single-quoted subshell"),
        ("sh -c \"sudo rm -rf /etc\"", "Sudo in a double-quoted subshell"),
        ("rm -rf --no-preserve-root /", "Root wipe past the guard"),
        ("rm -r -f /", "Root wipe with split flags"),
    ]
}

/// Commands that are ordinary work
fn caution_scenarios() -> Vec<(&'static str, &'static str)> {
    vec![
        ("ls -la", "Listing"),
        ("cat /etc/os-release", "Reading a file"),
        ("rm -rf ./target", "Removing a build dir"),
        ("grep -r sudoers docs/", "Word containing sudo"),
        ("echo pseudo-random", "Substring sudo"),
        ("git status", "Git"),
    ]
}

#[test]
fn test_critical_commands_are_flagged() {
    let mut missed = Vec::new();

    for (command, description) in critical_scenarios() {
        let reply = parse_reply(&shell_reply(command)).expect("reply parses");
        let request = assess(&reply.call).expect("assessable");

        if request.severity != Severity::Critical {
            missed.push(format!("{} ({})", description, command));
        } else {
            assert!(request.message.contains("EXTREMELY DANGEROUS"));
            assert!(request.message.contains(command));
        }
    }

    assert!(missed.is_empty(), "Not flagged as critical: {:#?}", missed);
}

#[test]
fn test_ordinary_commands_ask_with_caution() {
    let mut wrong = Vec::new();

    for (command, description) in caution_scenarios() {
        let reply = parse_reply(&shell_reply(command)).expect("reply parses");
        let request = assess(&reply.call).expect("assessable");

        if request.severity != Severity::Caution {
            wrong.push(format!("{} ({}) => {:?}", description, command, request.severity));
        }
    }

    assert!(wrong.is_empty(), "Unexpected severities: {:#?}", wrong);
}

#[test]
fn test_file_tools_warn_about_their_effect() {
    let write = parse_reply(
        r#"{"type":"tool_call","tool_call":{"tool_name":"write_file","params":{"file_path":"notes.md","content":"x"}}}"#,
    )
    .unwrap();
    let request = assess(&write.call).unwrap();
    assert_eq!(request.severity, Severity::Caution);
    assert!(request.message.contains("notes.md"));
    assert!(request.message.contains("OVERWRITTEN"));

    let read = parse_reply(
        r#"{"type":"tool_call","tool_call":{"tool_name":"read_file","params":{"file_path":"notes.md"}}}"#,
    )
    .unwrap();
    assert_eq!(assess(&read.call).unwrap().severity, Severity::Routine);
}

#[test]
fn test_legacy_alias_and_missing_command() {
    let alias = parse_reply(
        r#"{"type":"tool_call","tool_name":"run_command","params":{"command":"sudo reboot"}}"#,
    )
    .unwrap();
    let request = assess(&alias.call).unwrap();
    assert_eq!(request.tool_name, "run_shell_command");
    assert_eq!(request.severity, Severity::Critical);

    let empty = parse_reply(
        r#"{"type":"tool_call","tool_call":{"tool_name":"run_shell_command","params":{}}}"#,
    )
    .unwrap();
    assert_eq!(assess(&empty.call), Err(SafetyError::MissingCommand));
}
