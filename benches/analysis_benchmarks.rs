use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::DMatrix;
use symsim::*;

fn bench_simple_circuit(c: &mut Criterion) {
    let mut group = c.benchmark_group("simple_circuit");

    // Symbolic RC low-pass driven by a dc and an ac source
    let netlist_content = r#"
.title Simple RC Circuit
V1 1 0 dc 5 ac 1 1k
R1 1 2 R
C1 2 0 C
.end
"#;

    let parser = NetlistParser::new();
    let circuit = parser.parse_str(netlist_content).unwrap();

    group.bench_function("parse_netlist", |b| {
        b.iter(|| parser.parse_str(netlist_content).unwrap());
    });

    group.bench_function("node_voltage", |b| {
        b.iter(|| {
            // Clones start with an empty solution cache
            let fresh = circuit.clone();
            fresh.voltage("2").unwrap()
        });
    });

    group.bench_function("transfer_function", |b| {
        b.iter(|| circuit.transfer("1", "0", "2", "0").unwrap());
    });

    group.finish();
}

fn bench_ladder_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("symbolic_solver");

    // Resistive ladder with symbolic rungs: tridiagonal system of growing size
    for size in [4, 8, 12].iter() {
        group.bench_with_input(BenchmarkId::new("ladder", size), size, |b, &size| {
            let mut ctx = AnalysisContext::new();
            let g = RatFunc::var(ctx.symbol("G"));
            let mut matrix = DMatrix::from_element(size, size, RatFunc::zero());
            for i in 0..size {
                matrix[(i, i)] = &g + &g;
                if i > 0 {
                    matrix[(i, i - 1)] = -g.clone();
                    matrix[(i - 1, i)] = -g.clone();
                }
            }
            let rhs = DMatrix::from_element(size, 1, RatFunc::one());
            let names: Vec<String> = (0..size).map(|i| format!("V({})", i + 1)).collect();
            let solver = LinearSolver::new();

            b.iter(|| solver.solve(&matrix, &rhs, &names).unwrap());
        });
    }

    group.finish();
}

fn bench_state_space(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_space");

    let netlist_content = r#"
.title RLC
V1 1 0 step 1
R1 1 2 1
L1 2 3 1
C1 3 0 1
.end
"#;

    let circuit = NetlistParser::new().parse_str(netlist_content).unwrap();

    group.bench_function("rlc_model", |b| {
        b.iter(|| StateSpace::from_circuit(&circuit, &["3"]).unwrap());
    });

    group.bench_function("rlc_step_response", |b| {
        let bindings = Bindings::new(circuit.context());
        b.iter(|| {
            let time = circuit.clone().voltage("3").unwrap().time().unwrap();
            time.eval(1.0, &bindings).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_simple_circuit, bench_ladder_sizes, bench_state_space);
criterion_main!(benches);
