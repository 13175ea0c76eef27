use storage_types::{ObservedLogicalVolume, ObservedPhysicalVolume, ObservedVolumeGroup, RawValue};

use crate::command::{run_command, tools_available};
use crate::Result;

const PVS_COLUMNS: &str = "pv_name,vg_name,pv_size,pv_free,pv_uuid";
const VGS_COLUMNS: &str = "vg_name,vg_size,vg_free,pv_count,lv_count,vg_uuid";
const LVS_COLUMNS: &str = "vg_name,lv_name,lv_path,lv_size,lv_attr,pool_lv,data_percent";

/// Raw LVM layout of one host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LvmReport {
    pub physical_volumes: Vec<ObservedPhysicalVolume>,
    pub volume_groups: Vec<ObservedVolumeGroup>,
    pub logical_volumes: Vec<ObservedLogicalVolume>,
}

fn parse_tabbed_line(line: &str) -> Vec<String> {
    line.split('\t')
        .map(|part| part.trim().to_string())
        .collect()
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn raw(value: &str) -> Option<RawValue> {
    non_empty(value).map(RawValue::Text)
}

fn report_rows(output: &str, min_columns: usize) -> impl Iterator<Item = Vec<String>> + '_ {
    output.lines().filter_map(move |line| {
        if line.trim().is_empty() {
            return None;
        }
        let cols = parse_tabbed_line(line);
        if cols.len() < min_columns {
            tracing::debug!("Skipping short LVM report line: {line:?}");
            return None;
        }
        Some(cols)
    })
}

fn parse_pvs(output: &str) -> Vec<ObservedPhysicalVolume> {
    report_rows(output, 4)
        .map(|cols| ObservedPhysicalVolume {
            name: cols[0].clone(),
            vg_name: non_empty(&cols[1]),
            size: raw(&cols[2]),
            free: raw(&cols[3]),
            uuid: cols.get(4).and_then(|uuid| non_empty(uuid)),
        })
        .collect()
}

fn parse_vgs(output: &str) -> Vec<ObservedVolumeGroup> {
    report_rows(output, 5)
        .map(|cols| ObservedVolumeGroup {
            name: cols[0].clone(),
            size: raw(&cols[1]),
            free: raw(&cols[2]),
            pv_count: raw(&cols[3]),
            lv_count: raw(&cols[4]),
            uuid: cols.get(5).and_then(|uuid| non_empty(uuid)),
        })
        .collect()
}

fn parse_lvs(output: &str) -> Vec<ObservedLogicalVolume> {
    report_rows(output, 5)
        .map(|cols| ObservedLogicalVolume {
            vg_name: cols[0].clone(),
            name: cols[1].clone(),
            device_path: non_empty(&cols[2]),
            size: raw(&cols[3]),
            attr: non_empty(&cols[4]),
            pool_backref: cols.get(5).and_then(|pool| non_empty(pool)),
            thin_pool_fill_percent: cols.get(6).and_then(|percent| raw(percent)),
        })
        .collect()
}

fn report_args(columns: &str) -> [&str; 7] {
    [
        "--noheadings",
        "--units",
        "b",
        "-o",
        columns,
        "--separator",
        "\t",
    ]
}

/// Collect the LVM layout via `pvs`, `vgs` and `lvs`.
///
/// Returns an empty report when LVM support is compiled out or the tools are
/// not installed; a host without LVM simply has no volumes.
pub fn collect_lvm() -> Result<LvmReport> {
    if !cfg!(feature = "lvm-tools") {
        return Ok(LvmReport::default());
    }

    if !tools_available(&["pvs", "vgs", "lvs"]) {
        tracing::warn!("LVM tools not found - reporting an empty LVM layout");
        return Ok(LvmReport::default());
    }

    let pvs_output = run_command("pvs", &report_args(PVS_COLUMNS))?;
    let vgs_output = run_command("vgs", &report_args(VGS_COLUMNS))?;
    let lvs_output = run_command("lvs", &report_args(LVS_COLUMNS))?;

    Ok(LvmReport {
        physical_volumes: parse_pvs(&pvs_output),
        volume_groups: parse_vgs(&vgs_output),
        logical_volumes: parse_lvs(&lvs_output),
    })
}
