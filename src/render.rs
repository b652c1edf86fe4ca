use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::pipeline::Diagnosis;

pub const NO_TREATMENT_WARNING: &str = "No treatment info found for this class.";

const STYLE: &str = r#"
    body {
        background-color: #204E24;
        color: #FAF3C0;
        font-family: "Segoe UI", sans-serif;
        max-width: 760px;
        margin: 0 auto;
        padding: 24px;
    }
    h1, h2, h3, h4 { color: #FFD95A; font-weight: 700; }
    .centered { text-align: center; }
    label { color: #FFD95A; font-weight: 600; }
    button {
        background-color: #388E3C;
        color: #FAF3C0;
        border-radius: 8px;
        border: none;
        font-weight: bold;
        padding: 8px 16px;
        transition: 0.3s;
    }
    button:hover { background-color: #2E7D32; transform: scale(1.02); }
    .preview img { width: 100%; border-radius: 8px; }
    .preview figcaption { text-align: center; font-size: 0.9em; }
    .result-box {
        background-color: #2E7D32;
        border-radius: 12px;
        padding: 20px;
        margin-top: 20px;
        box-shadow: 0 0 15px rgba(0,0,0,0.3);
    }
    .probability { color: #FFF176; font-weight: bold; }
    .alert { border-radius: 8px; padding: 12px 16px; margin-top: 20px; }
    .alert.warning { background-color: #6D5F16; }
    .alert.error { background-color: #7A2323; }
    .footer { text-align: center; margin-top: 40px; font-size: 0.9em; color: #DCE775; }
"#;

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// The whole page; `results` goes below the upload form.
pub fn page(results: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Tomato Disease Detector</title>
<style>{STYLE}</style>
</head>
<body>
<h1 class="centered">🍅 Tomato Disease Detection App</h1>
<p class="centered">Upload a tomato leaf image to detect the disease and get treatment advice.</p>
<form action="/predict" method="post" enctype="multipart/form-data">
<label for="file">Upload a tomato leaf image...</label>
<input id="file" name="file" type="file" accept=".jpg,.jpeg,.png,image/jpeg,image/png" required>
<button type="submit">Detect</button>
</form>
<section id="results">{results}</section>
<div class="footer">Powered by actix-web &amp; tract</div>
</body>
</html>
"#
    )
}

pub fn preview(bytes: &[u8], mime: &str) -> String {
    format!(
        r#"<figure class="preview"><img src="data:{mime};base64,{}" alt="Uploaded leaf"><figcaption>Uploaded Image</figcaption></figure>"#,
        STANDARD.encode(bytes)
    )
}

pub fn diagnosis(diagnosis: &Diagnosis<'_>) -> String {
    match diagnosis {
        Diagnosis::Identified { prediction, record } => format!(
            r#"<div class="result-box">
<h3>🦠 Disease: {}</h3>
<p><strong>🔍 Description:</strong> {}</p>
<p><strong>💊 Cure:</strong> {}</p>
<p><strong>📊 Confidence:</strong> <span class="probability">{:.2}%</span></p>
</div>"#,
            escape(&record.disease),
            escape(&record.description),
            escape(&record.cure),
            prediction.confidence
        ),
        Diagnosis::Unmapped { prediction } => format!(
            r#"<div class="alert warning">{NO_TREATMENT_WARNING} (class {}, {:.2}%)</div>"#,
            prediction.class_index, prediction.confidence
        ),
        Diagnosis::Failed(e) => format!(
            r#"<div class="alert error">⚠️ Error processing image: {}</div>"#,
            escape(&e.to_string())
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::models::{DiseaseRecord, Prediction};

    #[test]
    fn identified_panel_shows_record_and_confidence() {
        let record = DiseaseRecord {
            disease: "Early Blight".into(),
            description: "Brown spots with rings.".into(),
            cure: "Apply chlorothalonil.".into(),
        };
        let prediction = Prediction::from_scores(&[0.9876, 0.0124]).unwrap();
        let html = diagnosis(&Diagnosis::Identified {
            prediction,
            record: &record,
        });
        assert!(html.contains("result-box"));
        assert!(html.contains("Disease: Early Blight"));
        assert!(html.contains("Brown spots with rings."));
        assert!(html.contains("Apply chlorothalonil."));
        assert!(html.contains("98.76%"));
    }

    #[test]
    fn unmapped_renders_warning() {
        let prediction = Prediction::from_scores(&[0.2, 0.8]).unwrap();
        let html = diagnosis(&Diagnosis::Unmapped { prediction });
        assert!(html.contains("alert warning"));
        assert!(html.contains(NO_TREATMENT_WARNING));
        assert!(!html.contains("result-box"));
    }

    #[test]
    fn failure_renders_cause() {
        let html = diagnosis(&Diagnosis::Failed(PipelineError::Inference("<boom>".into())));
        assert!(html.contains("alert error"));
        assert!(html.contains("Error processing image: model inference failed: &lt;boom&gt;"));
    }

    #[test]
    fn table_text_is_escaped() {
        assert_eq!(escape(r#"<b>"Mites" & 'thrips'</b>"#), "&lt;b&gt;&quot;Mites&quot; &amp; &#39;thrips&#39;&lt;/b&gt;");
    }

    #[test]
    fn page_wraps_results_with_upload_form() {
        let html = page("<p>marker</p>");
        assert!(html.contains("Tomato Disease Detection App"));
        assert!(html.contains(r#"enctype="multipart/form-data""#));
        assert!(html.contains("<section id=\"results\"><p>marker</p></section>"));
    }

    #[test]
    fn preview_embeds_data_uri() {
        let html = preview(&[1, 2, 3], "image/png");
        assert!(html.contains("data:image/png;base64,AQID"));
    }
}
