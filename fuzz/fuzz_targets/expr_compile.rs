#![no_main]

use libfuzzer_sys::fuzz_target;
use tangent_eval::CompiledExpr;

fuzz_target!(|data: &[u8]| {
    let Ok(src) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(expr) = CompiledExpr::compile(src) else {
        return;
    };
    let values: Vec<f64> = (0..expr.identifiers.len()).map(|i| 0.5 + i as f64).collect();
    let _ = expr.eval_real(&values);
});
