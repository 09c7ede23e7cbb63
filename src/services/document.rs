use crate::core::error::BookResult;
use crate::core::state::Story;
use crate::utils::html::{escape, sanitize_filename};
use log::info;
use std::fmt::Write;
use std::path::{Path, PathBuf};

const STYLE: &str = r#"    @page { size: letter portrait; margin: 0.5in; }
    body { font-family: Comic Sans MS, cursive, sans-serif; }
    .page { page-break-after: always; text-align: center; padding: 20px; }
    .page:last-child { page-break-after: avoid; }
    .page img { max-width: 100%; max-height: 70vh; border: 2px solid #000; }
    .dialogue { margin-top: 20px; font-size: 18px; }
    .dialogue p { margin: 5px 0; }
    .cover { display: flex; flex-direction: column; justify-content: center; align-items: center; height: 90vh; }
    .cover h1 { font-size: 36px; margin-bottom: 10px; }
    .cover h2 { font-size: 24px; font-weight: normal; color: #666; }
    .page-number { margin-top: 20px; font-size: 14px; color: #999; }
"#;

/// Renders the printable book: a cover followed by one page per story page.
pub fn render_html(story: &Story) -> String {
    let title = escape(&story.title);
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    html.push_str("  <meta charset=\"utf-8\">\n");
    let _ = writeln!(html, "  <title>{}</title>", title);
    html.push_str("  <style>\n");
    html.push_str(STYLE);
    html.push_str("  </style>\n</head>\n<body>\n");

    html.push_str("  <div class=\"page cover\">\n");
    let _ = writeln!(html, "    <h1>{}</h1>", title);
    let _ = writeln!(html, "    <h2>{}</h2>", escape(&story.subtitle));
    html.push_str(
        "    <p style=\"margin-top: 40px; font-size: 18px;\">A Coloring Book Adventure</p>\n",
    );
    html.push_str("  </div>\n");

    for (i, page) in story.pages.iter().enumerate() {
        let number = i + 1;
        html.push_str("  <div class=\"page\">\n");
        match page.image_url.as_deref() {
            Some(url) if !url.is_empty() => {
                let _ = writeln!(
                    html,
                    "    <img src=\"{}\" alt=\"Page {}\">",
                    escape(url),
                    number
                );
            }
            _ => html.push_str("    <p>[Image not available]</p>\n"),
        }
        html.push_str("    <div class=\"dialogue\">\n");
        for line in &page.dialogue {
            let _ = writeln!(html, "      <p>{}</p>", escape(line));
        }
        html.push_str("    </div>\n");
        let _ = writeln!(html, "    <div class=\"page-number\">— {} —</div>", number);
        html.push_str("  </div>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

pub fn file_name(story: &Story) -> String {
    format!("{}.html", sanitize_filename(&story.title))
}

/// Writes the rendered book into `output_folder` and returns its path.
pub async fn save(story: &Story, output_folder: impl AsRef<Path>) -> BookResult<PathBuf> {
    let dir = output_folder.as_ref();
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(file_name(story));
    tokio::fs::write(&path, render_html(story)).await?;
    info!("Saved coloring book to {}", path.display());
    Ok(path)
}
