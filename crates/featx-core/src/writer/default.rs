//! Generic XML fragment writer
//!
//! Each feature becomes a `<feature>` element (or `<summary type="...">` for
//! summaries) holding the output name and whichever of timestamp, duration,
//! values and label the feature carries:
//!
//! ```text
//! <feature>
//!     <name>RMS Level</name>
//!     <timestamp>0.000000000</timestamp>
//!     <values>0.25</values>
//! </feature>
//! ```

use std::io::{Stdout, Write};

use super::{format_time, FeatureWriter, WriterResult};
use crate::plugin::{Feature, OutputDescriptor};
use crate::transform::Transform;

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub struct DefaultFeatureWriter<W: Write> {
    out: W,
}

impl DefaultFeatureWriter<Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> DefaultFeatureWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FeatureWriter for DefaultFeatureWriter<W> {
    fn description(&self) -> &str {
        "Write features in a generic XML format, with <feature> or <summary> elements \
         containing output name and some or all of timestamp, duration, values, and label."
    }

    fn write(
        &mut self,
        _source_id: &str,
        _transform: &Transform,
        output: &OutputDescriptor,
        features: &[Feature],
        summary: &str,
    ) -> WriterResult<()> {
        let out = &mut self.out;
        for feature in features {
            if summary.is_empty() {
                writeln!(out, "<feature>")?;
            } else {
                writeln!(out, "<summary type=\"{}\">", escape(summary))?;
            }
            writeln!(out, "\t<name>{}</name>", escape(&output.name))?;
            if let Some(t) = feature.timestamp {
                writeln!(out, "\t<timestamp>{}</timestamp>", format_time(t))?;
            }
            if let Some(d) = feature.duration {
                writeln!(out, "\t<duration>{}</duration>", format_time(d))?;
            }
            if !feature.values.is_empty() {
                let values: Vec<String> = feature
                    .values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| match output.bin_names.get(i) {
                        Some(bin) => format!("{}:{}", escape(bin), v),
                        None => v.to_string(),
                    })
                    .collect();
                writeln!(out, "\t<values>{}</values>", values.join(" "))?;
            }
            if !feature.label.is_empty() {
                writeln!(out, "\t<label>{}</label>", escape(&feature.label))?;
            }
            if summary.is_empty() {
                writeln!(out, "</feature>")?;
            } else {
                writeln!(out, "</summary>")?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> WriterResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn render(output: &OutputDescriptor, features: &[Feature], summary: &str) -> String {
        let mut writer = DefaultFeatureWriter::new(Vec::new());
        writer
            .write("a.wav", &Transform::new("featx:power"), output, features, summary)
            .unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_feature_element() {
        let output = OutputDescriptor::new("rms", "RMS Level");
        let text = render(&output, &[Feature::at(Duration::from_millis(500), vec![0.25])], "");
        assert_eq!(
            text,
            "<feature>\n\t<name>RMS Level</name>\n\t<timestamp>0.500000000</timestamp>\n\t<values>0.25</values>\n</feature>\n"
        );
    }

    #[test]
    fn test_summary_element_with_bins_and_label() {
        let mut output = OutputDescriptor::new("chroma", "Chroma").with_bin_count(Some(2));
        output.bin_names = vec!["C".to_string(), "C#".to_string()];
        let feature = Feature {
            timestamp: None,
            duration: Some(Duration::from_secs(2)),
            values: vec![1.0, 0.5],
            label: "a<b".to_string(),
        };
        let text = render(&output, &[feature], "mean");
        assert!(text.starts_with("<summary type=\"mean\">\n"));
        assert!(text.contains("\t<duration>2.000000000</duration>\n"));
        assert!(text.contains("\t<values>C:1 C#:0.5</values>\n"));
        assert!(text.contains("\t<label>a&lt;b</label>\n"));
        assert!(!text.contains("<timestamp>"));
        assert!(text.ends_with("</summary>\n"));
    }

    #[test]
    fn test_empty_list_writes_nothing() {
        let output = OutputDescriptor::new("rms", "RMS Level");
        assert!(render(&output, &[], "").is_empty());
    }
}
