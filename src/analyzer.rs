use anyhow::{anyhow, Result};
use colored::*;
use log::{info, warn};
use ndarray::Array1;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use std::time::Instant;

use crate::algebra::{Bindings, RatFunc};
use crate::circuit::Circuit;
use crate::cli::OutputFormat;
use crate::context::{AnalysisContext, Render};
use crate::parser::NetlistParser;
use crate::solver::SolverConfig;
use crate::statespace::StateSpace;
use crate::superposition::Superposition;

/// Which view of each result is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// Every domain part side by side.
    All,
    Time,
    Laplace,
    Dc,
    Ac,
    Noise,
    Fourier,
}

impl View {
    pub fn from_name(name: &str) -> Option<View> {
        match name.to_ascii_lowercase().as_str() {
            "all" => Some(View::All),
            "time" | "t" => Some(View::Time),
            "laplace" | "s" => Some(View::Laplace),
            "dc" => Some(View::Dc),
            "ac" => Some(View::Ac),
            "noise" => Some(View::Noise),
            "fourier" | "f" => Some(View::Fourier),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub solver_config: SolverConfig,
    /// Solve independent domains on the rayon pool.
    pub parallel: bool,
    /// Samples in numeric time-domain exports.
    pub grid_points: usize,
    pub view: View,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            solver_config: SolverConfig::default(),
            parallel: true,
            grid_points: 101,
            view: View::All,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuantityReport {
    pub name: String,
    pub quantity: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainReport {
    pub domain: String,
    pub unknowns: usize,
    pub eliminations: usize,
    pub initial_value_problem: bool,
    pub solve_time: f64,
}

/// Rendered results of one analysis run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub title: String,
    pub view: View,
    pub domains: Vec<DomainReport>,
    pub node_voltages: Vec<QuantityReport>,
    pub branch_currents: Vec<QuantityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_space: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<TimeSeries>,
    pub total_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampledColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// Numeric time-domain samples on a uniform grid
#[derive(Debug, Clone, Serialize)]
pub struct TimeSeries {
    pub time: Vec<f64>,
    pub columns: Vec<SampledColumn>,
}

/// Analysis session over one circuit
pub struct Analyzer {
    circuit: Option<Circuit>,
    config: AnalyzerConfig,
    report: Option<AnalysisReport>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Analyzer::with_config(AnalyzerConfig::default())
    }

    pub fn with_config(config: AnalyzerConfig) -> Self {
        Analyzer {
            circuit: None,
            config,
            report: None,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn load_netlist(&mut self, path: &Path) -> Result<()> {
        info!("Loading netlist from: {}", path.display());
        let circuit = NetlistParser::new().parse_file(path)?;
        self.load_circuit(circuit)
    }

    pub fn load_circuit(&mut self, mut circuit: Circuit) -> Result<()> {
        circuit.set_parallel(self.config.parallel);
        circuit.set_solver_config(self.config.solver_config.clone());
        circuit.validate()?;
        info!("Loaded circuit: {}", circuit.title);
        self.circuit = Some(circuit);
        self.report = None;
        Ok(())
    }

    pub fn circuit(&self) -> Result<&Circuit> {
        self.circuit.as_ref().ok_or_else(|| anyhow!("No circuit loaded"))
    }

    /// Replaces the symbol `name` by `value` in the loaded circuit.
    pub fn substitute(&mut self, name: &str, value: &RatFunc) -> Result<()> {
        let circuit = self.circuit()?;
        if circuit.context().registry.lookup(name).is_none() {
            warn!("Symbol '{}' does not occur in '{}'", name, circuit.title);
        }
        let substituted = circuit.substitute(name, value);
        self.circuit = Some(substituted);
        self.report = None;
        Ok(())
    }

    /// Solves every domain and renders node voltages and branch currents. A
    /// non-empty `nodes` restricts the report to those node voltages.
    pub fn run(&mut self, nodes: &[String]) -> Result<&AnalysisReport> {
        let start_time = Instant::now();
        let circuit = self.circuit()?;
        let ctx = circuit.context();
        info!("Starting analysis of '{}'", circuit.title);

        let domains = circuit
            .solve_all()?
            .iter()
            .map(|s| DomainReport {
                domain: s.domain.render(ctx),
                unknowns: s.stats.size,
                eliminations: s.stats.eliminations,
                initial_value_problem: s.initial_value_problem,
                solve_time: s.stats.solve_time,
            })
            .collect();

        let voltages = if nodes.is_empty() {
            circuit.node_voltages()?
        } else {
            nodes
                .iter()
                .map(|n| Ok((n.clone(), circuit.voltage(n)?)))
                .collect::<crate::error::Result<Vec<_>>>()?
        };
        let currents = if nodes.is_empty() { circuit.branch_currents()? } else { Vec::new() };

        let view = self.config.view;
        let render = |prefix: &str, items: Vec<(String, Superposition)>| -> Result<Vec<QuantityReport>> {
            items
                .into_iter()
                .map(|(name, value)| {
                    Ok(QuantityReport {
                        name: format!("{}({})", prefix, name),
                        quantity: value.quantity.to_string(),
                        value: render_view(&value, view, ctx)?,
                    })
                })
                .collect()
        };
        let report = AnalysisReport {
            title: circuit.title.clone(),
            view,
            domains,
            node_voltages: render("V", voltages)?,
            branch_currents: render("I", currents)?,
            state_space: None,
            samples: None,
            total_time: start_time.elapsed().as_secs_f64(),
        };
        info!("Analysis completed in {:.3}ms", report.total_time * 1000.0);
        Ok(self.report.insert(report))
    }

    /// Samples node voltages (or every reported quantity when `nodes` is empty)
    /// on `points` times in `[0, tstop]`. Every symbol must have been substituted.
    pub fn time_series(&mut self, nodes: &[String], tstop: f64, points: Option<usize>) -> Result<&TimeSeries> {
        let points = points.unwrap_or(self.config.grid_points).max(2);
        let circuit = self.circuit.as_ref().ok_or_else(|| anyhow!("No circuit loaded"))?;
        let bindings = Bindings::new(circuit.context());
        let times = Array1::linspace(0.0, tstop, points);

        let mut quantities: Vec<(String, Superposition)> = Vec::new();
        if nodes.is_empty() {
            for (name, v) in circuit.node_voltages()? {
                quantities.push((format!("V({})", name), v));
            }
            for (name, i) in circuit.branch_currents()? {
                quantities.push((format!("I({})", name), i));
            }
        } else {
            for name in nodes {
                quantities.push((format!("V({})", name), circuit.voltage(name)?));
            }
        }

        let mut columns = Vec::with_capacity(quantities.len());
        for (name, value) in quantities {
            let expr = value.time()?;
            if expr.conditional {
                warn!("{} is only known for t >= 0", name);
            }
            let samples = expr
                .eval_grid(&times, &bindings)
                .map_err(|e| anyhow!("{}: {} (use --subs to give every symbol a value)", name, e))?;
            columns.push(SampledColumn {
                name,
                values: samples.to_vec(),
            });
        }
        info!("Sampled {} quantities at {} points", columns.len(), points);
        let series = TimeSeries {
            time: times.to_vec(),
            columns,
        };
        let report = self.report.get_or_insert_with(|| empty_report(circuit));
        Ok(report.samples.insert(series))
    }

    /// State-space model with the independent sources as inputs and the voltage of
    /// `output` as the output.
    pub fn state_space(&mut self, output: &str) -> Result<StateSpace> {
        let circuit = self.circuit.as_ref().ok_or_else(|| anyhow!("No circuit loaded"))?;
        let model = StateSpace::from_circuit(circuit, &[output])?;
        let text = model.render(circuit.context());
        let report = self.report.get_or_insert_with(|| empty_report(circuit));
        report.state_space = Some(text);
        Ok(model)
    }

    pub fn get_report(&self) -> Option<&AnalysisReport> {
        self.report.as_ref()
    }

    /// Export the report to file
    pub fn export_results(&self, filename: &Path, format: OutputFormat) -> Result<()> {
        let report = self
            .report
            .as_ref()
            .ok_or_else(|| anyhow!("No analysis results available"))?;
        match format {
            OutputFormat::Csv => match &report.samples {
                Some(series) => self.export_csv_samples(series, filename),
                None => self.export_csv_report(report, filename),
            },
            OutputFormat::Json => self.export_json(report, filename),
        }
    }

    fn export_csv_samples(&self, series: &TimeSeries, filename: &Path) -> Result<()> {
        let file = File::create(filename)?;
        let mut writer = csv::Writer::from_writer(file);

        let mut header = vec!["time".to_string()];
        header.extend(series.columns.iter().map(|c| c.name.clone()));
        writer.write_record(&header)?;

        for (i, time) in series.time.iter().enumerate() {
            let mut record = vec![time.to_string()];
            for column in &series.columns {
                record.push(column.values.get(i).copied().unwrap_or(f64::NAN).to_string());
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        info!("Samples exported to CSV: {}", filename.display());
        Ok(())
    }

    fn export_csv_report(&self, report: &AnalysisReport, filename: &Path) -> Result<()> {
        let file = File::create(filename)?;
        let mut writer = csv::Writer::from_writer(file);
        for row in report.node_voltages.iter().chain(&report.branch_currents) {
            writer.serialize(row)?;
        }
        writer.flush()?;
        info!("Results exported to CSV: {}", filename.display());
        Ok(())
    }

    fn export_json(&self, report: &AnalysisReport, filename: &Path) -> Result<()> {
        let file = File::create(filename)?;
        serde_json::to_writer_pretty(file, report)?;
        info!("Results exported to JSON: {}", filename.display());
        Ok(())
    }

    pub fn print_summary(&self) {
        let report = match &self.report {
            Some(report) => report,
            None => {
                println!("No analysis results available");
                return;
            }
        };
        println!("\n{}", format!("=== {} ===", report.title).bold());
        println!("View: {:?}", report.view);
        println!("Total analysis time: {:.3}ms", report.total_time * 1000.0);
        if !report.domains.is_empty() {
            println!("\n{}", "Domains:".bold());
            for d in &report.domains {
                let ivp = if d.initial_value_problem { " (t >= 0)" } else { "" };
                println!(
                    "  {}{}: {} unknowns, {} eliminations",
                    d.domain.cyan(),
                    ivp,
                    d.unknowns,
                    d.eliminations
                );
            }
        }
        for (heading, rows) in [("Node voltages:", &report.node_voltages), ("Branch currents:", &report.branch_currents)] {
            if rows.is_empty() {
                continue;
            }
            println!("\n{}", heading.bold());
            for row in rows {
                println!("  {} = {}", row.name.bright_blue(), row.value);
            }
        }
        if let Some(model) = &report.state_space {
            println!("\n{}", "State space:".bold());
            for line in model.lines() {
                println!("  {}", line);
            }
        }
        if let Some(series) = &report.samples {
            println!(
                "\n{} {} quantities x {} samples",
                "Sampled:".bold(),
                series.columns.len(),
                series.time.len()
            );
        }
    }
}

fn empty_report(circuit: &Circuit) -> AnalysisReport {
    AnalysisReport {
        title: circuit.title.clone(),
        view: View::All,
        domains: Vec::new(),
        node_voltages: Vec::new(),
        branch_currents: Vec::new(),
        state_space: None,
        samples: None,
        total_time: 0.0,
    }
}

/// Text of one view of `value`.
pub fn render_view(value: &Superposition, view: View, ctx: &AnalysisContext) -> crate::error::Result<String> {
    Ok(match view {
        View::All => value.render(ctx),
        View::Time => {
            let expr = value.time()?;
            let mut text = expr.render(ctx);
            if expr.conditional {
                text.push_str("  (t >= 0)");
            }
            if expr.approximate {
                text.push_str("  (numeric roots)");
            }
            text
        }
        View::Laplace => value.laplace()?.render(ctx),
        View::Dc => value.dc().render(ctx),
        View::Ac => {
            if value.ac().is_empty() {
                "0".to_string()
            } else {
                value
                    .ac()
                    .iter()
                    .map(|(omega, phasor)| format!("{}: {}", omega.render(ctx), phasor.render(ctx)))
                    .collect::<Vec<_>>()
                    .join("; ")
            }
        }
        View::Noise => value.noise_amplitude(ctx).render(ctx),
        View::Fourier => value.fourier()?.render(ctx),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DIVIDER: &str = "V1 1 0 10\nR1 1 2 R1\nR2 2 0 R2\n";
    const RC_STEP: &str = ".title rc\nV1 1 0 step 1\nR1 1 2 1\nC1 2 0 1\n";

    fn analyzer(netlist: &str) -> Analyzer {
        let mut analyzer = Analyzer::new();
        analyzer.load_circuit(netlist.parse().unwrap()).unwrap();
        analyzer
    }

    #[test]
    fn test_view_names() {
        assert_eq!(View::from_name("Laplace"), Some(View::Laplace));
        assert_eq!(View::from_name("t"), Some(View::Time));
        assert_eq!(View::from_name("bode"), None);
    }

    #[test]
    fn test_run_reports_every_quantity() {
        let mut analyzer = analyzer(DIVIDER);
        let report = analyzer.run(&[]).unwrap();
        assert_eq!(report.node_voltages.len(), 2);
        assert_eq!(report.branch_currents.len(), 3);
        assert_eq!(report.node_voltages[0].name, "V(1)");
        assert_eq!(report.node_voltages[0].value, "10");
        assert_eq!(report.node_voltages[1].quantity, "voltage");
        assert_eq!(report.domains.len(), 1);
    }

    #[test]
    fn test_node_filter_and_substitution() {
        let mut analyzer = analyzer(DIVIDER);
        analyzer.substitute("R1", &RatFunc::from_int(3)).unwrap();
        analyzer.substitute("R2", &RatFunc::from_int(2)).unwrap();
        let report = analyzer.run(&["2".to_string()]).unwrap();
        assert_eq!(report.node_voltages.len(), 1);
        assert!(report.branch_currents.is_empty());
        assert_eq!(report.node_voltages[0].value, "4");
        assert!(analyzer.run(&["9".to_string()]).is_err());
    }

    #[test]
    fn test_time_series_of_rc_step() {
        let mut analyzer = analyzer(RC_STEP);
        let series = analyzer.time_series(&["2".to_string()], 1.0, Some(11)).unwrap();
        assert_eq!(series.time.len(), 11);
        let v = &series.columns[0];
        assert_eq!(v.name, "V(2)");
        approx::assert_relative_eq!(v.values[10], 1.0 - (-1.0f64).exp(), epsilon = 1e-9);
        approx::assert_relative_eq!(v.values[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_time_series_needs_numeric_values() {
        let mut analyzer = analyzer("V1 1 0 step 1\nR1 1 2 R\nC1 2 0 1\n");
        let err = analyzer.time_series(&["2".to_string()], 1.0, Some(3)).unwrap_err();
        assert!(err.to_string().contains("--subs"));
    }

    #[test]
    fn test_exports() {
        let dir = tempdir().unwrap();
        let mut analyzer = analyzer(RC_STEP);
        analyzer.run(&[]).unwrap();
        analyzer.state_space("2").unwrap();

        let json_path = dir.path().join("report.json");
        analyzer.export_results(&json_path, OutputFormat::Json).unwrap();
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["title"], "rc");
        assert!(json["state_space"].as_str().unwrap().contains("A = "));

        let table = dir.path().join("report.csv");
        analyzer.export_results(&table, OutputFormat::Csv).unwrap();
        let text = std::fs::read_to_string(&table).unwrap();
        assert!(text.starts_with("name,quantity,value"));

        analyzer.time_series(&[], 2.0, Some(5)).unwrap();
        let samples = dir.path().join("samples.csv");
        analyzer.export_results(&samples, OutputFormat::Csv).unwrap();
        let mut reader = csv::Reader::from_path(&samples).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "time");
        assert!(headers.iter().any(|h| h == "V(2)"));
        assert_eq!(reader.records().count(), 5);
    }
}
