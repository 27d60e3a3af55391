// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VLAN lookup scripts for the test overlay
//!
//! Tests on the device call `lava-vland-names`, `lava-vland-self` and
//! `lava-vland-tags` to find which interface carries each requested vlan.

use async_trait::async_trait;
use lava_core::{Action, Connection, LavaError, RunContext, ValidateContext};
use lava_protocols::vland::NAME as VLAND;
use serde_json::{json, Map, Value};
use std::path::Path;

const NAMES_BODY: &str = r#"# friendly name -> interface
if [ -z "$1" ]; then
    printf "$LAVA_VLAND_NAMES"
else
    printf "$LAVA_VLAND_NAMES" | grep "^$1," | cut -d, -f2
fi
"#;

const SELF_BODY: &str = r#"# interface,mac,sysfs for every interface
printf "$LAVA_VLAND_SELF"
"#;

const TAGS_BODY: &str = r#"# interface,tag for every tagged interface
if [ -z "$1" ]; then
    printf "$LAVA_VLAND_TAGS"
else
    printf "$LAVA_VLAND_TAGS" | grep "^$1," | cut -d, -f2
fi
"#;

/// Writes the vland lookup scripts into the overlay's `bin` directory.
///
/// Does nothing unless the job asks for the vland protocol.
pub struct VlandOverlayAction;

fn check_device(cx: &ValidateContext<'_>) -> Result<(), String> {
    if !cx.device().parameters.is_object() {
        return Err("Device lacks parameters".to_string());
    }
    if cx.device().interfaces().is_none() {
        return Err("Device lacks vland interfaces data.".to_string());
    }
    Ok(())
}

fn field<'a>(interface: &'a Value, key: &str) -> &'a str {
    interface.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// `iface,mac,sysfs` for each interface
fn self_lines(interfaces: &Map<String, Value>) -> Vec<String> {
    interfaces
        .iter()
        .map(|(name, iface)| {
            format!("{},{},{}", name, field(iface, "mac"), field(iface, "sysfs"))
        })
        .collect()
}

/// `iface,tag` for each tag; the primary interface has none
fn tag_lines(interfaces: &Map<String, Value>) -> Vec<String> {
    interfaces
        .iter()
        .flat_map(|(name, iface)| {
            iface
                .get("tags")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .map(move |tag| format!("{},{}", name, tag))
        })
        .collect()
}

/// `friendly,iface` for each vlan the protocol bound
fn name_lines(data: &Value) -> Vec<String> {
    data.get("bindings")
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
        .filter_map(|(friendly, binding)| {
            let iface = binding.get("iface")?.as_str()?;
            Some(format!("{},{}", friendly, iface))
        })
        .collect()
}

/// Shell script exporting `lines` as one escaped-newline variable
fn script(shell: &str, variable: &str, lines: &[String], body: &str) -> String {
    let mut out = format!("#!{}\n\n{}=\"", shell, variable);
    if lines.is_empty() {
        out.push_str("\\n");
    }
    for line in lines {
        out.push_str(line);
        out.push_str("\\n");
    }
    out.push_str("\"\n\n");
    out.push_str(body);
    out
}

async fn write_script(path: &Path, content: &str) -> Result<(), LavaError> {
    let failed = |e: std::io::Error| {
        LavaError::infrastructure(format!("Unable to write {}: {}", path.display(), e))
    };
    tokio::fs::write(path, content).await.map_err(failed)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(failed)?;
    }
    Ok(())
}

#[async_trait]
impl Action for VlandOverlayAction {
    fn name(&self) -> &str {
        "lava-vland-overlay"
    }

    fn summary(&self) -> &str {
        "Add files detailing vlan configuration."
    }

    fn description(&self) -> &str {
        "Populate specific vland scripts for tests to lookup vlan data."
    }

    fn section(&self) -> Option<&str> {
        Some("deploy")
    }

    fn validate(&mut self, cx: &mut ValidateContext<'_>) -> Result<(), LavaError> {
        if !cx.parameters().contains_key(VLAND) || cx.protocol(VLAND).is_none() {
            return Ok(());
        }
        if let Err(message) = check_device(cx) {
            cx.error(message);
        }
        Ok(())
    }

    async fn run(
        &mut self,
        cx: &mut RunContext<'_>,
        _connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<Option<Box<dyn Connection>>, LavaError> {
        // the protocol borrow must not live across an await
        let data = match cx.env().protocols.get(VLAND) {
            Some(protocol) if cx.parameters().contains_key(VLAND) => protocol.data(),
            _ => {
                tracing::debug!("skipped {}", self.name());
                return Ok(None);
            }
        };
        let names = name_lines(&data);
        let interfaces = cx
            .device()
            .interfaces()
            .ok_or_else(|| LavaError::job("Device lacks vland interfaces data."))?;
        let own = self_lines(interfaces);
        let tags = tag_lines(interfaces);
        let shell = cx
            .device()
            .constants
            .get("lava_test_sh_cmd")
            .and_then(Value::as_str)
            .unwrap_or("/bin/sh")
            .to_string();

        let results_dir = crate::test::results_dir(cx);
        let bin = cx
            .env()
            .tmp_dir
            .join("overlay")
            .join(results_dir.trim_start_matches('/'))
            .join("bin");
        tokio::fs::create_dir_all(&bin).await.map_err(|e| {
            LavaError::infrastructure(format!("Unable to create {}: {}", bin.display(), e))
        })?;
        let scripts = [
            ("lava-vland-names", "LAVA_VLAND_NAMES", &names, NAMES_BODY),
            ("lava-vland-self", "LAVA_VLAND_SELF", &own, SELF_BODY),
            ("lava-vland-tags", "LAVA_VLAND_TAGS", &tags, TAGS_BODY),
        ];
        for (file, variable, lines, body) in scripts {
            let path = bin.join(file);
            tracing::debug!("Creating {}", path.display());
            write_script(&path, &script(&shell, variable, lines, body)).await?;
        }

        cx.set_result("vlans", json!(names.len()));
        cx.set_namespace_data(
            "lava-vland-overlay",
            "vland",
            "bin",
            json!(bin.to_string_lossy()),
        );
        Ok(None)
    }
}

#[cfg(test)]
#[path = "overlay_tests.rs"]
mod tests;
