//! Markdown rendering for the license report.

use crate::PackageEntry;

/// Render one package as a `##` section, terminated by a horizontal rule.
/// Optional fields that are absent or empty are omitted entirely; the
/// license type falls back to `N/A`.
pub fn package_section(package: &PackageEntry) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", package.name));
    section.push_str(&format!("Version: {}\n", package.version));

    if let Some(url) = nonempty(&package.url) {
        section.push_str(&format!("\nURL: {url}\n"));
    }
    if let Some(author) = nonempty(&package.author) {
        section.push_str(&format!("\nAuthor: {author}\n"));
    }
    if let Some(content) = nonempty(&package.content) {
        section.push_str(&format!("\n\n{content}\n\n"));
    }

    section.push_str(&format!(
        "\nDescription: {}\n",
        package.description.as_deref().unwrap_or("")
    ));

    if let Some(file) = nonempty(&package.file) {
        section.push_str(&format!("\nFile: {file}\n"));
    }

    section.push_str(&format!(
        "Type: {}\n\n\n---\n\n",
        package.license_type.as_deref().unwrap_or("N/A")
    ));

    section
}

fn nonempty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
