use crate::DriveRecord;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::process::Command;

/// Mount points that mark a device as hosting the running system
const SYSTEM_MOUNTS: &[&str] = &["/", "/boot", "/boot/efi", "/efi", "/usr", "/var", "[SWAP]"];

const LSBLK_COLUMNS: &str = "NAME,PATH,SIZE,FSTYPE,LABEL,MOUNTPOINT,RM,TYPE,MODEL";

/// Device path -> mount points, from /proc/mounts
pub type MountTable = HashMap<String, Vec<String>>;

#[derive(Debug, Deserialize)]
pub(crate) struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LsblkDevice {
    name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    size: u64,
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    rm: bool,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

// Older lsblk releases print numbers and flags as strings
fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) != 0,
        Some(Value::String(s)) => matches!(s.trim(), "1" | "true"),
        _ => false,
    })
}

impl LsblkDevice {
    fn device_path(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("/dev/{}", self.name))
    }

    fn mount_points(&self, mounts: &MountTable) -> Vec<String> {
        let mut points: Vec<String> = self.mountpoint.iter().cloned().collect();
        if let Some(extra) = mounts.get(&self.device_path()) {
            for point in extra {
                if !points.contains(point) {
                    points.push(point.clone());
                }
            }
        }
        points
    }

    /// True if this device or anything stacked on it (partitions, LVM, crypt) runs the OS
    fn hosts_system(&self, mounts: &MountTable) -> bool {
        let swap = self.fstype.as_deref() == Some("swap") && self.mountpoint.is_some();
        swap || self
            .mount_points(mounts)
            .iter()
            .any(|m| DriveDetector::is_system_mount(m))
            || self.children.iter().any(|c| c.hosts_system(mounts))
    }
}

pub struct DriveDetector;

impl DriveDetector {
    /// Enumerate whole disks and partitions.
    ///
    /// Never fails: if the scan cannot run, an empty inventory is returned and the reason
    /// is logged. Devices that cannot be classified are left out.
    pub fn list_drives() -> Vec<DriveRecord> {
        let mounts = fs::read_to_string("/proc/mounts")
            .map(|text| Self::parse_mounts(&text))
            .unwrap_or_default();

        let output = match Command::new("lsblk")
            .args(["-J", "-b", "-o", LSBLK_COLUMNS])
            .output()
        {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                log::warn!(
                    "lsblk failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                return Vec::new();
            }
            Err(e) => {
                log::warn!("Failed to run lsblk: {}", e);
                return Vec::new();
            }
        };

        match Self::parse_lsblk(&String::from_utf8_lossy(&output.stdout), &mounts) {
            Ok(drives) => {
                log::debug!("Inventory found {} targets", drives.len());
                drives
            }
            Err(e) => {
                log::warn!("Unreadable lsblk output: {}", e);
                Vec::new()
            }
        }
    }

    /// Convert `lsblk -J -b` output into records.
    pub(crate) fn parse_lsblk(
        json: &str,
        mounts: &MountTable,
    ) -> Result<Vec<DriveRecord>, serde_json::Error> {
        let parsed: LsblkOutput = serde_json::from_str(json)?;
        let mut records = Vec::new();

        for device in &parsed.blockdevices {
            if Self::should_skip_device(&device.name) {
                continue;
            }
            Self::collect(device, None, mounts, &mut records);
        }

        Ok(records)
    }

    fn collect(
        device: &LsblkDevice,
        parent: Option<(&str, bool)>,
        mounts: &MountTable,
        out: &mut Vec<DriveRecord>,
    ) {
        if device.kind != "disk" && device.kind != "part" {
            return;
        }

        let path = device.device_path();
        if device.size == 0 {
            log::debug!("Skipping {}: no capacity reported", path);
            return;
        }

        let label = device
            .label
            .clone()
            .or_else(|| device.model.as_ref().map(|m| m.trim().to_string()))
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| device.name.clone());
        let is_removable = device.rm || parent.map(|(_, rm)| rm).unwrap_or(false);

        out.push(DriveRecord {
            path: path.clone(),
            label,
            filesystem_type: device
                .fstype
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            total_bytes: device.size,
            is_system_volume: device.hosts_system(mounts),
            is_removable,
            mount_point: device.mount_points(mounts).into_iter().next(),
            parent_device: parent.map(|(p, _)| p.to_string()),
        });

        for child in &device.children {
            Self::collect(child, Some((&path, is_removable)), mounts, out);
        }
    }

    /// Parse /proc/mounts, decoding the octal escapes used for spaces and tabs.
    pub(crate) fn parse_mounts(text: &str) -> MountTable {
        let mut table = MountTable::new();
        for line in text.lines() {
            let mut fields = line.split_whitespace();
            let (Some(device), Some(point)) = (fields.next(), fields.next()) else {
                continue;
            };
            if !device.starts_with('/') {
                continue;
            }
            table
                .entry(unescape_mount(device))
                .or_default()
                .push(unescape_mount(point));
        }
        table
    }

    /// Check if device should be skipped
    pub(crate) fn should_skip_device(device_name: &str) -> bool {
        // Skip loop devices, ram disks, device mapper, etc.
        device_name.starts_with("loop")
            || device_name.starts_with("ram")
            || device_name.starts_with("dm-")
            || device_name.starts_with("sr") // CD/DVD drives
            || device_name.starts_with("zram")
    }

    pub(crate) fn is_system_mount(mount_point: &str) -> bool {
        SYSTEM_MOUNTS.contains(&mount_point)
    }
}

fn unescape_mount(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escape = bytes
            .get(i + 1..i + 4)
            .filter(|digits| bytes[i] == b'\\' && digits.iter().all(|b| (b'0'..=b'7').contains(b)))
            .map(|d| d.iter().fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0')))
            .and_then(|code| u8::try_from(code).ok());

        match escape {
            Some(code) => {
                out.push(code);
                i += 4;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
