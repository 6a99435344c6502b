//! Benchmarks for syntax highlighting and validation performance
//!
//! Run with: cargo bench --bench syntax

use ropey::Rope;
use vtl_preview::model::{BufferKind, DocumentBuffer, EditDelta};
use vtl_preview::syntax::{LanguageId, SyntaxHighlights};
use vtl_preview::validation::{validate_data, validate_template};

#[global_allocator]
static ALLOC: divan::AllocProfiler = divan::AllocProfiler::system();

fn main() {
    divan::main();
}

// ============================================================================
// Sample sources
// ============================================================================

const VELOCITY_SAMPLE: &str = r#"## Order confirmation
#set($total = 0)
<html>
<body>
  <h1>Hello $!{customer.firstName} $customer.lastName.toUpperCase()</h1>
  #* Items are grouped
     by category *#
  <table>
  #foreach($item in $order.items)
    #set($total = $total + $item.price * $item.qty)
    <tr class="#if($foreach.count % 2 == 0)even#{else}odd#end">
      <td>$item.name</td>
      <td>${item.qty}</td>
      <td>$item.price</td>
    </tr>
  #end
  </table>
  #if($total > 100 && !$customer.vip)
    <p>Free shipping on your next order!</p>
  #elseif($customer.vip)
    <p>Thank you for being a VIP.</p>
  #end
  #[[ Raw $text #if ]]#
  <p>Total: $total, sent $format_date('%Y-%m-%d')</p>
</body>
</html>
"#;

fn generate_large_velocity(lines: usize) -> String {
    let mut out = String::new();
    let sample_lines: Vec<&str> = VELOCITY_SAMPLE.lines().collect();
    for i in 0..lines {
        out.push_str(sample_lines[i % sample_lines.len()]);
        out.push('\n');
    }
    out
}

fn generate_large_json(entries: usize) -> String {
    let mut out = String::from("{\n  \"items\": [\n");
    for i in 0..entries {
        out.push_str(&format!(
            "    {{\"name\": \"item {}\", \"qty\": {}, \"price\": {}.5, \"active\": true}},\n",
            i,
            i % 7,
            i
        ));
    }
    out.push_str("    null\n  ]\n}\n");
    out
}

// ============================================================================
// Full highlighting
// ============================================================================

#[divan::bench(args = [100, 1000, 5000])]
fn highlight_large_velocity(lines: usize) {
    let rope = Rope::from(generate_large_velocity(lines));
    let highlights = SyntaxHighlights::from_source(LanguageId::Velocity, &rope, 1);
    divan::black_box(highlights);
}

#[divan::bench(args = [100, 1000, 5000])]
fn highlight_large_json(entries: usize) {
    let rope = Rope::from(generate_large_json(entries));
    let highlights = SyntaxHighlights::from_source(LanguageId::Json, &rope, 1);
    divan::black_box(highlights);
}

// ============================================================================
// Incremental edits
// ============================================================================

#[divan::bench(args = [10, 50, 100])]
fn incremental_small_edits(iterations: usize) {
    let mut doc =
        DocumentBuffer::with_text(BufferKind::Template, &generate_large_velocity(1000));
    let mut highlights = SyntaxHighlights::from_source(LanguageId::Velocity, &doc.buffer, 0);

    for _ in 0..iterations {
        let mid = doc.len_chars() / 2;
        if let Ok(Some(edit)) = doc.apply(&EditDelta::insert(mid, "x")) {
            let range = highlights.apply_edit(&doc.buffer, edit, doc.version);
            divan::black_box(range);
        }
    }
}

#[divan::bench(args = [10, 50])]
fn incremental_comment_toggle(iterations: usize) {
    let mut doc =
        DocumentBuffer::with_text(BufferKind::Template, &generate_large_velocity(1000));
    let mut highlights = SyntaxHighlights::from_source(LanguageId::Velocity, &doc.buffer, 0);

    for _ in 0..iterations {
        // Opening a comment at the top re-highlights to the end; removing it
        // restores the original states.
        if let Ok(Some(edit)) = doc.apply(&EditDelta::insert(0, "#*")) {
            highlights.apply_edit(&doc.buffer, edit, doc.version);
        }
        if let Ok(Some(edit)) = doc.apply(&EditDelta::delete(0, 2)) {
            highlights.apply_edit(&doc.buffer, edit, doc.version);
        }
    }
    divan::black_box(&highlights);
}

// ============================================================================
// Validation
// ============================================================================

#[divan::bench(args = [100, 1000, 5000])]
fn validate_large_template(lines: usize) {
    let source = generate_large_velocity(lines);
    divan::black_box(validate_template(&source));
}

#[divan::bench(args = [100, 1000, 5000])]
fn validate_large_data(entries: usize) {
    let source = generate_large_json(entries);
    divan::black_box(validate_data(&source));
}
