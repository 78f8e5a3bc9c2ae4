use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use haltwatch_agent::{
    ClassFileHook, ClassIdentity, ClassLoadEvent, ClassLoadInterceptor, MethodInstrumentor,
    TargetRegistry,
};
use haltwatch_classfile::access::{ACC_PUBLIC, ACC_STATIC};
use haltwatch_classfile::code::opcode::*;
use haltwatch_classfile::{ClassFile, CodeAttribute};

/// A `java/lang/Shutdown` look-alike padded with `filler` extra methods.
fn shutdown_class(filler: usize) -> Vec<u8> {
    let mut class = ClassFile::new("java/lang/Shutdown", "java/lang/Object", 52).unwrap();
    class
        .add_method(
            ACC_STATIC,
            "halt",
            "(I)V",
            Some(&CodeAttribute::new(1, 1, vec![ILOAD_0, POP, RETURN])),
        )
        .unwrap();
    for i in 0..filler {
        class
            .add_method(
                ACC_PUBLIC,
                &format!("helper{}", i),
                "()V",
                Some(&CodeAttribute::new(0, 1, vec![RETURN])),
            )
            .unwrap();
    }
    class.to_bytes()
}

fn bench_instrument(c: &mut Criterion) {
    let registry = TargetRegistry::builtin().unwrap();
    let shutdown = ClassIdentity::new("java/lang/Shutdown");

    for filler in [0usize, 200] {
        let bytes = shutdown_class(filler);
        c.bench_function(&format!("instrument_halt_{}", filler), |b| {
            b.iter(|| {
                MethodInstrumentor::new(&registry)
                    .instrument(black_box(&bytes), &shutdown, &["halt"])
                    .unwrap()
                    .len()
            })
        });
    }

    // Second pass over instrumented bytes: parse plus marker check only
    {
        let once = MethodInstrumentor::new(&registry)
            .instrument(&shutdown_class(0), &shutdown, &["halt"])
            .unwrap()
            .into_owned();
        c.bench_function("instrument_halt_already_done", |b| {
            b.iter(|| {
                MethodInstrumentor::new(&registry)
                    .instrument(black_box(&once), &shutdown, &["halt"])
                    .unwrap()
                    .len()
            })
        });
    }
}

fn bench_interceptor_passthrough(c: &mut Criterion) {
    let hook = ClassLoadInterceptor::new(Arc::new(TargetRegistry::builtin().unwrap()));
    let bytes = shutdown_class(0);
    c.bench_function("interceptor_non_target", |b| {
        b.iter(|| {
            hook.transform(black_box(&ClassLoadEvent::define("com/example/App", &bytes)))
                .unwrap()
                .len()
        })
    });
}

criterion_group!(benches, bench_instrument, bench_interceptor_passthrough);
criterion_main!(benches);
