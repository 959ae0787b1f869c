//! Slicer adapter (Slic3r)
//!
//! The print profile is fixed: nozzle, speeds, accelerations, retraction and bed
//! placement never vary between runs so that toolpaths stay comparable. Only fill
//! density, filament diameter and layer height are tunable ([`SlicerSettings`]).

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

use crate::error::ProcessingError;
use crate::tool::run_tool;

/// The three tunables of a slicing run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlicerSettings {
    pub fill_density: f64,
    /// mm
    pub filament_diameter: f64,
    /// mm
    pub layer_height: f64,
}

impl Default for SlicerSettings {
    fn default() -> Self {
        Self {
            fill_density: 0.4,
            filament_diameter: 2.8,
            layer_height: 0.25,
        }
    }
}

/// Absolute value (mm, mm/s), or a percentage of a related setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Amount {
    Absolute(f64),
    Percent(u32),
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Absolute(value) => write!(f, "{}", value),
            Amount::Percent(value) => write!(f, "{}%", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedTable {
    pub travel: Amount,
    pub perimeter: Amount,
    pub small_perimeter: Amount,
    pub external_perimeter: Amount,
    pub infill: Amount,
    pub solid_infill: Amount,
    pub top_solid_infill: Amount,
    pub support_material: Amount,
    pub bridge: Amount,
    pub gap_fill: Amount,
    pub first_layer: Amount,
}

/// mm/s²; zero disables acceleration control for that feature.
#[derive(Debug, Clone, PartialEq)]
pub struct AccelerationTable {
    pub perimeter: f64,
    pub infill: f64,
    pub bridge: f64,
    pub default: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfillProfile {
    pub every_layers: u32,
    pub solid_every_layers: u32,
    pub perimeters: u32,
    pub top_solid_layers: u32,
    pub bottom_solid_layers: u32,
    pub fill_angle: u32,
    pub fill_pattern: String,
    pub solid_fill_pattern: String,
    pub extra_perimeters: bool,
    pub randomize_start: bool,
    pub avoid_crossing_perimeters: bool,
    pub external_perimeters_first: bool,
    pub only_retract_when_crossing_perimeters: bool,
    pub solid_infill_below_area: f64,
    pub only_where_needed: bool,
    pub infill_first: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetractionProfile {
    pub length: f64,
    pub speed: f64,
    pub restart_extra: f64,
    pub before_travel: f64,
    pub lift: f64,
    pub layer_change: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacementProfile {
    pub scale: f64,
    pub rotate: f64,
    pub duplicate: u32,
    pub bed_size: (u32, u32),
    pub duplicate_grid: (u32, u32),
    pub duplicate_distance: f64,
    pub resolution: f64,
}

/// Complete Slic3r invocation profile.
#[derive(Debug, Clone, PartialEq)]
pub struct SlicerProfile {
    pub settings: SlicerSettings,
    pub nozzle_diameter: f64,
    pub print_center: (u32, u32),
    pub gcode_flavor: String,
    pub relative_e_distances: bool,
    pub extrusion_multiplier: f64,
    pub temperature: u32,
    pub bed_temperature: u32,
    pub speeds: SpeedTable,
    pub accelerations: AccelerationTable,
    pub first_layer_height: Amount,
    pub infill: InfillProfile,
    pub retraction: RetractionProfile,
    pub placement: PlacementProfile,
}

impl SlicerProfile {
    /// The fixed print profile with the given tunables.
    pub fn new(settings: SlicerSettings) -> Self {
        Self {
            settings,
            nozzle_diameter: 0.35,
            print_center: (100, 100),
            gcode_flavor: "reprap".to_string(),
            relative_e_distances: true,
            extrusion_multiplier: 1.0,
            temperature: 185,
            bed_temperature: 60,
            speeds: SpeedTable {
                travel: Amount::Absolute(130.0),
                perimeter: Amount::Absolute(30.0),
                small_perimeter: Amount::Absolute(30.0),
                external_perimeter: Amount::Percent(70),
                infill: Amount::Absolute(80.0),
                solid_infill: Amount::Absolute(60.0),
                top_solid_infill: Amount::Absolute(50.0),
                support_material: Amount::Absolute(60.0),
                bridge: Amount::Absolute(60.0),
                gap_fill: Amount::Absolute(20.0),
                first_layer: Amount::Percent(30),
            },
            accelerations: AccelerationTable {
                perimeter: 0.0,
                infill: 0.0,
                bridge: 0.0,
                default: 130.0,
            },
            first_layer_height: Amount::Percent(100),
            infill: InfillProfile {
                every_layers: 1,
                solid_every_layers: 0,
                perimeters: 3,
                top_solid_layers: 3,
                bottom_solid_layers: 3,
                fill_angle: 45,
                fill_pattern: "rectilinear".to_string(),
                solid_fill_pattern: "rectilinear".to_string(),
                extra_perimeters: true,
                randomize_start: true,
                avoid_crossing_perimeters: false,
                external_perimeters_first: false,
                only_retract_when_crossing_perimeters: true,
                solid_infill_below_area: 70.0,
                only_where_needed: false,
                infill_first: false,
            },
            retraction: RetractionProfile {
                length: 1.0,
                speed: 30.0,
                restart_extra: 0.0,
                before_travel: 2.0,
                lift: 0.0,
                layer_change: true,
            },
            placement: PlacementProfile {
                scale: 1.0,
                rotate: 0.0,
                duplicate: 1,
                bed_size: (200, 200),
                duplicate_grid: (1, 1),
                duplicate_distance: 6.0,
                resolution: 0.0,
            },
        }
    }

    /// Serialize to the argument list following the executable name.
    pub fn to_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = ArgList::default();
        args.push(input.to_string_lossy());
        args.value("--output", output.to_string_lossy());
        args.value("--nozzle-diameter", self.nozzle_diameter);
        args.pair("--print-center", self.print_center);
        args.value("--gcode-flavor", &self.gcode_flavor);
        if self.relative_e_distances {
            args.push("--use-relative-e-distances");
        }
        args.value("--filament-diameter", self.settings.filament_diameter);
        args.value("--extrusion-multiplier", self.extrusion_multiplier);
        args.value("--temperature", self.temperature);
        args.value("--bed-temperature", self.bed_temperature);

        let speeds = &self.speeds;
        args.value("--travel-speed", speeds.travel);
        args.value("--perimeter-speed", speeds.perimeter);
        args.value("--small-perimeter-speed", speeds.small_perimeter);
        args.value("--external-perimeter-speed", speeds.external_perimeter);
        args.value("--infill-speed", speeds.infill);
        args.value("--solid-infill-speed", speeds.solid_infill);
        args.value("--top-solid-infill-speed", speeds.top_solid_infill);
        args.value("--support-material-speed", speeds.support_material);
        args.value("--bridge-speed", speeds.bridge);
        args.value("--gap-fill-speed", speeds.gap_fill);
        args.value("--first-layer-speed", speeds.first_layer);

        let accelerations = &self.accelerations;
        args.value("--perimeter-acceleration", accelerations.perimeter);
        args.value("--infill-acceleration", accelerations.infill);
        args.value("--bridge-acceleration", accelerations.bridge);
        args.value("--default-acceleration", accelerations.default);

        args.value("--layer-height", self.settings.layer_height);
        args.value("--first-layer-height", self.first_layer_height);

        let infill = &self.infill;
        args.value("--infill-every-layers", infill.every_layers);
        args.value("--solid-infill-every-layers", infill.solid_every_layers);
        args.value("--perimeters", infill.perimeters);
        args.value("--top-solid-layers", infill.top_solid_layers);
        args.value("--bottom-solid-layers", infill.bottom_solid_layers);
        args.value("--fill-density", self.settings.fill_density);
        args.value("--fill-angle", infill.fill_angle);
        args.value("--fill-pattern", &infill.fill_pattern);
        args.value("--solid-fill-pattern", &infill.solid_fill_pattern);
        args.toggle("--extra-perimeters", infill.extra_perimeters);
        args.toggle("--randomize-start", infill.randomize_start);
        args.toggle("--avoid-crossing-perimeters", infill.avoid_crossing_perimeters);
        args.toggle("--external-perimeters-first", infill.external_perimeters_first);
        args.toggle(
            "--only-retract-when-crossing-perimeters",
            infill.only_retract_when_crossing_perimeters,
        );
        args.value("--solid-infill-below-area", infill.solid_infill_below_area);
        args.toggle("--infill-only-where-needed", infill.only_where_needed);
        args.toggle("--infill-first", infill.infill_first);

        let retraction = &self.retraction;
        args.value("--retract-length", retraction.length);
        args.value("--retract-speed", retraction.speed);
        args.value("--retract-restart-extra", retraction.restart_extra);
        args.value("--retract-before-travel", retraction.before_travel);
        args.value("--retract-lift", retraction.lift);
        args.toggle("--retract-layer-change", retraction.layer_change);

        let placement = &self.placement;
        args.value("--scale", placement.scale);
        args.value("--rotate", placement.rotate);
        args.value("--duplicate", placement.duplicate);
        args.pair("--bed-size", placement.bed_size);
        args.pair("--duplicate-grid", placement.duplicate_grid);
        args.value("--duplicate-distance", placement.duplicate_distance);
        args.value("--resolution", placement.resolution);

        args.0
    }
}

#[derive(Default)]
struct ArgList(Vec<String>);

impl ArgList {
    fn push(&mut self, arg: impl fmt::Display) {
        self.0.push(arg.to_string());
    }

    fn value(&mut self, flag: &str, value: impl fmt::Display) {
        self.push(flag);
        self.push(value);
    }

    fn toggle(&mut self, flag: &str, on: bool) {
        self.value(flag, if on { "yes" } else { "no" });
    }

    fn pair(&mut self, flag: &str, (a, b): (u32, u32)) {
        self.value(flag, format!("{},{}", a, b));
    }
}

/// Filament figures reported by a slicing run, as the slicer printed them.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceReport {
    /// mm
    pub filament_length: String,
    /// cm³
    pub extruded_volume: String,
    /// Captured stdout/stderr, kept for diagnostics.
    pub tool_output: String,
}

/// Extract `(filament_length, extruded_volume)` from slicer stdout.
///
/// Only the first line containing `Filament required` is considered. Missing
/// figures are reported as `"0"`.
pub fn parse_filament_report(stdout: &str) -> (String, String) {
    let line = match stdout.lines().find(|line| line.contains("Filament required")) {
        Some(line) => line,
        None => return ("0".to_string(), "0".to_string()),
    };
    let length = between(line, "required: ", "mm (").unwrap_or("0");
    let volume = between(line, "mm (", "cm3)").unwrap_or("0");
    (length.to_string(), volume.to_string())
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let len = text[from..].find(end)?;
    Some(&text[from..from + len])
}

#[async_trait]
pub trait Slicer: Send + Sync {
    /// Slice `input` into a toolpath at `output`.
    ///
    /// Implementations do not judge the exit status; a run that produced no
    /// toolpath is detected by the caller checking `output`.
    async fn slice(
        &self,
        input: &Path,
        output: &Path,
        settings: &SlicerSettings,
    ) -> Result<SliceReport, ProcessingError>;
}

/// Slic3r command-line slicer.
#[derive(Debug, Clone)]
pub struct Slic3r {
    slic3r_path: String,
    timeout: Duration,
}

impl Slic3r {
    pub fn new(slic3r_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            slic3r_path: slic3r_path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Slicer for Slic3r {
    #[tracing::instrument(skip(self, settings))]
    async fn slice(
        &self,
        input: &Path,
        output: &Path,
        settings: &SlicerSettings,
    ) -> Result<SliceReport, ProcessingError> {
        let args = SlicerProfile::new(*settings).to_args(input, output);
        let mut command = Command::new(&self.slic3r_path);
        command.args(&args);

        let result = run_tool("slic3r", command, self.timeout)
            .await
            .map_err(|e| match e {
                ProcessingError::ExternalToolLaunchFailed { message, .. } => {
                    ProcessingError::SlicingFailed {
                        message: format!("could not start {}: {}", self.slic3r_path, message),
                        tool_output: None,
                    }
                }
                other => other,
            })?;

        if !result.status.success() {
            tracing::warn!(
                exit_code = result.status.code(),
                "Slicer exited with non-zero status"
            );
        }

        let (filament_length, extruded_volume) = parse_filament_report(&result.stdout);
        tracing::info!(
            filament_length = %filament_length,
            extruded_volume = %extruded_volume,
            "Slicer finished"
        );

        Ok(SliceReport {
            filament_length,
            extruded_volume,
            tool_output: result.combined(),
        })
    }
}
