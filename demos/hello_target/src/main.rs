//! suzume でデバッグするための小さなプログラム
//!
//! `main -> e -> a` の呼び出しチェーンを持ち、バックトレースやステップ実行の確認に使います。
//! フレームポインタ付きでビルドされる前提です（`.cargo/config.toml`）。

#[inline(never)]
fn a(x: i64) -> i64 {
    let doubled = x * 2;
    doubled + 1
}

#[inline(never)]
fn e(x: i64) -> i64 {
    let first = a(x);
    let second = a(first);
    first + second
}

fn main() {
    let mut total = 0;
    for i in 0..3 {
        total += e(i);
    }
    println!("total = {}", total);
}
