//! Benchmarks for the compiler and the VM.

use std::io;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use skiff::bytecode::compiler::compile;
use skiff::bytecode::gc::Heap;
use skiff::Vm;

/// Compile and execute, output discarded.
fn run_source(source: &str) {
    let mut vm = Vm::with_output(Box::new(io::sink()));
    vm.interpret(source).expect("benchmark program failed");
}

const FIB_RECURSIVE: &str = "\
fun fib(n) {
    if (n < 2) return n;
    return fib(n - 1) + fib(n - 2);
}
fib(18);
";

const LOOP_SUM: &str = "\
var sum = 0;
for (var i = 0; i < 10000; i = i + 1) {
    sum = sum + i;
}
";

const CLOSURE_COUNTER: &str = "\
fun mk() {
    var x = 0;
    fun inc() { x = x + 1; return x; }
    return inc;
}
var c = mk();
for (var i = 0; i < 5000; i = i + 1) c();
";

const STRING_CONCAT: &str = "\
var s = \"\";
for (var i = 0; i < 200; i = i + 1) {
    s = s + \"chunk\";
}
";

const METHOD_CALLS: &str = "\
class Counter {
    init() { this.n = 0; }
    bump() { this.n = this.n + 1; }
}
var c = Counter();
for (var i = 0; i < 5000; i = i + 1) c.bump();
";

fn execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("execution");

    group.bench_function("fib_recursive", |b| {
        b.iter(|| run_source(black_box(FIB_RECURSIVE)))
    });
    group.bench_function("loop_sum", |b| b.iter(|| run_source(black_box(LOOP_SUM))));
    group.bench_function("closure_counter", |b| {
        b.iter(|| run_source(black_box(CLOSURE_COUNTER)))
    });
    group.bench_function("string_concat", |b| {
        b.iter(|| run_source(black_box(STRING_CONCAT)))
    });
    group.bench_function("method_calls", |b| {
        b.iter(|| run_source(black_box(METHOD_CALLS)))
    });

    group.finish();
}

fn fib_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_scaling");

    for n in [10, 15, 20].iter() {
        let source = format!(
            "fun fib(n) {{ if (n < 2) return n; return fib(n - 1) + fib(n - 2); }} fib({});",
            n
        );
        group.bench_with_input(BenchmarkId::from_parameter(n), &source, |b, src| {
            b.iter(|| run_source(black_box(src)))
        });
    }

    group.finish();
}

/// Compilation alone, no execution.
fn compilation_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation_overhead");

    group.bench_function("compile_fib", |b| {
        b.iter(|| {
            let mut heap = Heap::new();
            compile(black_box(FIB_RECURSIVE), &mut heap).unwrap()
        })
    });
    group.bench_function("compile_methods", |b| {
        b.iter(|| {
            let mut heap = Heap::new();
            compile(black_box(METHOD_CALLS), &mut heap).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, execution, fib_scaling, compilation_overhead);
criterion_main!(benches);
