use chronicle_engine::{
    Entity, EntityCriteria, Prominence, Relationship, RelationshipCriteria, WorldGraph,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn populated_graph(entities: usize) -> WorldGraph {
    let mut graph = WorldGraph::new(["derived_from".to_string()]);
    for i in 0..entities {
        let kind = if i % 3 == 0 { "settlement" } else { "npc" };
        graph.set_entity(
            Entity::new(format!("{kind}_{i:06}"), kind, "common", 0)
                .with_status("active")
                .with_prominence(if i % 7 == 0 {
                    Prominence::Renowned
                } else {
                    Prominence::Marginal
                })
                .with_tag(format!("region{}", i % 10)),
        );
    }
    // A sparse relationship fabric, ~2 edges per entity.
    for i in 1..entities {
        let src = if i % 3 == 1 { "npc" } else { "settlement" };
        let a = format!("{src}_{i:06}");
        let b = format!("{}_{:06}", if i % 3 == 0 { "settlement" } else { "npc" }, i - 1);
        if graph.has_entity(&a) && graph.has_entity(&b) {
            graph.add_relationship("knows", a, b, Some(0.5 + (i % 5) as f64 / 10.0), None, None);
        }
    }
    graph
}

fn benchmark_entity_insert(c: &mut Criterion) {
    c.bench_function("graph/set_entity 1k", |b| {
        b.iter(|| {
            let mut graph = WorldGraph::new([]);
            for i in 0..1_000 {
                graph.set_entity(black_box(
                    Entity::new(format!("npc_{i:06}"), "npc", "common", 0).with_tag("bench"),
                ));
            }
            graph
        })
    });
}

fn benchmark_find_entities(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/find_entities");
    for size in [1_000usize, 5_000] {
        let graph = populated_graph(size);
        group.bench_with_input(BenchmarkId::new("by_tag", size), &graph, |b, graph| {
            b.iter(|| {
                graph.find_entities(black_box(
                    &EntityCriteria::default().with_tag("region3"),
                ))
            })
        });
        group.bench_with_input(BenchmarkId::new("by_kind", size), &graph, |b, graph| {
            b.iter(|| graph.find_entities(black_box(&EntityCriteria::kind("npc"))))
        });
    }
    group.finish();
}

fn benchmark_find_relationships(c: &mut Criterion) {
    let graph = populated_graph(5_000);
    c.bench_function("graph/find_relationships by_kind_src", |b| {
        b.iter(|| {
            graph.find_relationships(black_box(
                &RelationshipCriteria::kind("knows").with_src("npc_000004"),
            ))
        })
    });
}

fn benchmark_relationship_push(c: &mut Criterion) {
    c.bench_function("graph/push_relationship 1k", |b| {
        b.iter_batched(
            || populated_graph(1_000),
            |mut graph| {
                for i in 0..500 {
                    let rel = Relationship::new(
                        "rivals",
                        format!("npc_{:06}", i * 2 + 1),
                        format!("npc_{:06}", i * 2 + 2),
                        0,
                    );
                    graph.push_relationship(black_box(rel));
                }
                graph
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    benchmark_entity_insert,
    benchmark_find_entities,
    benchmark_find_relationships,
    benchmark_relationship_push
);
criterion_main!(benches);
