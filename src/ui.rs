//! Terminal output used before tracing is initialised.
//!
//! Configuration problems are reported here because the logging setup
//! itself comes from the configuration.

/// Width of error box separators.
const ERROR_BOX_WIDTH: usize = 60;

/// Print an error box with a title and optional detail.
///
/// Outputs:
/// ```text
/// ============================================================
/// Configuration Error
/// ============================================================
///
/// <detail>
/// ```
pub fn print_error_box(title: &str, detail: Option<&str>) {
    eprintln!("\n{}", "=".repeat(ERROR_BOX_WIDTH));
    eprintln!("{title}");
    eprintln!("{}", "=".repeat(ERROR_BOX_WIDTH));

    if let Some(detail) = detail
        && !detail.is_empty()
    {
        eprintln!("\n{detail}");
    }
}

/// Print an error box followed by numbered hints.
pub fn print_error_box_with_hints(title: &str, detail: Option<&str>, hints: &[&str]) {
    print_error_box(title, detail);

    if !hints.is_empty() {
        eprintln!("\n{}", "=".repeat(ERROR_BOX_WIDTH));
        eprintln!("Common Issues:");
        eprintln!("{}", "=".repeat(ERROR_BOX_WIDTH));

        for (i, hint) in hints.iter().enumerate() {
            eprintln!("\n{}. {hint}", i + 1);
        }
        eprintln!();
    }
}
