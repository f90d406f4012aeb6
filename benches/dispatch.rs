use criterion::{black_box, criterion_group, criterion_main, Criterion};
use regrid_bridge::{
    dispatch_chunked, ArrayBuf, ChunkPlan, KernelArray, KernelCall, KernelFlag, KernelRoutine,
};
use std::os::raw::c_int;
use std::slice;

unsafe extern "C" fn double_f64(
    inputs: *const *const KernelArray,
    n_inputs: c_int,
    outputs: *const *mut KernelArray,
    _n_outputs: c_int,
    _flags: *const KernelFlag,
    _n_flags: c_int,
) -> c_int {
    let input = &**inputs.add(n_inputs as usize - 1);
    let output = &mut **outputs;
    let shape = slice::from_raw_parts(input.shape, input.ndim as usize);
    let len: usize = shape.iter().product();
    let src = slice::from_raw_parts(input.addr as *const f64, len);
    let dst = slice::from_raw_parts_mut(output.addr as *mut f64, len);
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = 2.0 * s;
    }
    0
}

fn bench_dispatch(c: &mut Criterion) {
    let routine = unsafe { KernelRoutine::new("double", double_f64, 1) };
    let rows = 256;
    let cols = 512;
    let mut values: Vec<f64> = (0..rows * cols).map(|i| i as f64).collect();
    // sprinkle missing values so conditioning does real work
    for i in (0..values.len()).step_by(97) {
        values[i] = f64::NAN;
    }
    let data = ArrayBuf::from_vec(values, vec![rows, cols]).unwrap();
    let call = KernelCall::new(&routine);

    c.bench_function("single_block", |b| {
        b.iter(|| {
            call.invoke(&[], &black_box(data.view()), &[rows, cols])
                .unwrap()
        })
    });

    let plan = ChunkPlan::new(vec![vec![32; 8], vec![cols]]);
    c.bench_function("chunked_8_blocks", |b| {
        b.iter(|| {
            dispatch_chunked(&call, &[], &black_box(data.view()), &plan, &plan).unwrap()
        })
    });
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
