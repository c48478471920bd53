use criterion::{black_box, criterion_group, criterion_main, Criterion};
use solar::script::lexer::tokenize;
use solar::script::stmt::parse_program;
use solar::script::Interpreter;

const FIB: &str = "\
solar_def fib(n):
  if n < 2:
    return n
  end
  return fib(n - 1) + fib(n - 2)
end
let r = fib(15)
";

const LOOPS: &str = "\
let total = 0
for i in range(2000):
  if i % 3 == 0:
    continue
  end
  let total = total + i
end
";

fn make_source(repeats: usize) -> String {
    let chunk = "let x = 1 + 2 * (3 - 4) / 5\nif x > 0: print \"positive\" else: print x end\n";
    chunk.repeat(repeats)
}

fn bench_front_end(c: &mut Criterion) {
    let small = make_source(10);
    let large = make_source(1000);

    let mut g = c.benchmark_group("front_end");
    g.bench_function("tokenize_small", |b| b.iter(|| tokenize(black_box(&small))));
    g.bench_function("tokenize_large", |b| b.iter(|| tokenize(black_box(&large))));
    g.bench_function("parse_small", |b| b.iter(|| parse_program(black_box(&small))));
    g.bench_function("parse_large", |b| b.iter(|| parse_program(black_box(&large))));
    g.finish();
}

fn bench_execute(c: &mut Criterion) {
    let mut g = c.benchmark_group("execute");
    g.bench_function("fib_15", |b| {
        b.iter(|| {
            let mut interp = Interpreter::new();
            interp.run_source(black_box(FIB))
        })
    });
    g.bench_function("loop_2000", |b| {
        b.iter(|| {
            let mut interp = Interpreter::new();
            interp.run_source(black_box(LOOPS))
        })
    });
    g.finish();
}

criterion_group!(benches, bench_front_end, bench_execute);
criterion_main!(benches);
