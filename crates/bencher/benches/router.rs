use std::hint::black_box;

use bencher::{RouterInput, TestCase};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use micro_event::router::{all, get, Router};
use micro_event::{handler_fn, Event};

static SMALL: RouterInput = RouterInput::new(&["/", "/users", "/users/:id"], &["/", "/users/42", "/missing"]);

static API: RouterInput = RouterInput::new(
    &[
        "/",
        "/health",
        "/users",
        "/users/me",
        "/users/:id",
        "/users/:id/posts",
        "/users/:id/posts/:post",
        "/teams/:team/members/:member",
        "/orgs/:org/repos/:repo/issues/:issue",
        "/static/**:path",
        "/files/*/raw",
    ],
    &[
        "/health",
        "/users/me",
        "/users/42",
        "/users/42/posts/7?draft=true",
        "/teams/core/members/alice",
        "/orgs/acme/repos/web/issues/1234",
        "/static/css/site/main.css",
        "/files/readme/raw",
        "/nowhere/to/be/found",
    ],
);

async fn noop(_event: &mut Event) {}

fn create_test_cases() -> Vec<TestCase<RouterInput>> {
    vec![TestCase::small("small_router", SMALL), TestCase::normal("api_router", API)]
}

fn router(input: &RouterInput) -> Router {
    input
        .patterns()
        .iter()
        .fold(Router::builder(), |builder, pattern| builder.route(*pattern, get(handler_fn(noop)).post(handler_fn(noop))))
        .route("/fallback/**", all(handler_fn(noop)))
        .build()
        .expect("benchmark routes should not conflict")
}

fn benchmark_router_lookup(criterion: &mut Criterion) {
    let test_cases = create_test_cases();
    let mut group = criterion.benchmark_group("router_lookup");

    for case in test_cases {
        let router = router(case.input());
        group.throughput(Throughput::Elements(case.input().paths().len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &case, |b, case| {
            b.iter(|| {
                for path in case.input().paths() {
                    black_box(router.at(black_box(path)).map(|matched| matched.params().len()));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(routing, benchmark_router_lookup);
criterion_main!(routing);
