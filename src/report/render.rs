use genpdf::elements::{Break, FrameCellDecorator, Image as PdfImage, Paragraph, TableLayout};
use genpdf::style::Style;
use genpdf::{Alignment, Document, Element as _, PaperSize, SimplePageDecorator};
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::{debug, warn};

use super::image::prepare_photo;
use super::score::{Rgb, ScoreGrade};
use crate::analysis::NutritionEstimate;
use crate::config::{PageSize, ReportConfig, UserProfile};
use crate::error::RenderError;

const IMAGE_DPI: f64 = 150.0;
/// 5in x 3in photo box at `IMAGE_DPI`.
const PHOTO_MAX_W_PX: u32 = 750;
const PHOTO_MAX_H_PX: u32 = 450;
const MARGIN_MM: i32 = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBadge {
    pub score: u8,
    pub grade: ScoreGrade,
    pub color: Rgb,
}

impl ScoreBadge {
    pub fn text(&self) -> String {
        format!("Health Score: {}/100 ({})", self.score, self.grade.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroRow {
    pub nutrient: &'static str,
    pub amount_g: f64,
    pub target_g: f64,
}

/// Everything the page shows, in page order, before it is laid out as PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLayout {
    pub title: String,
    pub calories: String,
    pub descriptor: Option<String>,
    pub badge: ScoreBadge,
    pub macros: [MacroRow; 3],
    pub macro_split: Option<String>,
    pub allergens: Option<String>,
    pub insight: Option<String>,
    pub tip: Option<String>,
    pub footer: String,
}

impl ReportLayout {
    pub fn build(
        estimate: &NutritionEstimate,
        profile: &UserProfile,
        config: &ReportConfig,
        generated_on: Date,
    ) -> Self {
        let grade = config.thresholds.grade(estimate.score);
        let descriptor = [estimate.food_type.as_deref(), estimate.portion_size.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" | ");
        let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.trim().to_string());
        let date = generated_on
            .format(format_description!("[month repr:long] [day padding:none], [year]"))
            .unwrap_or_else(|_| generated_on.to_string());

        Self {
            title: estimate.food_name.clone(),
            calories: format!("{} KCal", estimate.calories),
            descriptor: non_empty(&descriptor),
            badge: ScoreBadge {
                score: estimate.score,
                grade,
                color: config.palette.grade_color(grade),
            },
            macros: [
                MacroRow {
                    nutrient: "Protein",
                    amount_g: estimate.protein_g,
                    target_g: profile.daily_protein_g,
                },
                MacroRow {
                    nutrient: "Carbohydrates",
                    amount_g: estimate.carbs_g,
                    target_g: profile.daily_carbs_g,
                },
                MacroRow {
                    nutrient: "Fat",
                    amount_g: estimate.fat_g,
                    target_g: profile.daily_fat_g,
                },
            ],
            macro_split: macro_split(estimate),
            allergens: (!estimate.allergens.is_empty())
                .then(|| format!("Possible allergens: {}", estimate.allergens.join(", "))),
            insight: non_empty(&estimate.insight),
            tip: non_empty(&estimate.tip),
            footer: format!("Generated by FoodInsight AI - {date}"),
        }
    }
}

fn macro_split(estimate: &NutritionEstimate) -> Option<String> {
    let total = estimate.protein_g + estimate.carbs_g + estimate.fat_g;
    if total <= 0.0 {
        return None;
    }
    let pct = |g: f64| (g / total * 100.0).round();
    Some(format!(
        "Protein {:.0}% | Carbs {:.0}% | Fat {:.0}%",
        pct(estimate.protein_g),
        pct(estimate.carbs_g),
        pct(estimate.fat_g)
    ))
}

/// Single-page meal summary.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    config: ReportConfig,
}

impl ReportRenderer {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    /// A photo that cannot be decoded or embedded is left out; the page is still produced.
    pub fn render(
        &self,
        image: &[u8],
        estimate: &NutritionEstimate,
        profile: &UserProfile,
    ) -> Result<Vec<u8>, RenderError> {
        let layout = ReportLayout::build(
            estimate,
            profile,
            &self.config,
            OffsetDateTime::now_utc().date(),
        );
        let palette = &self.config.palette;

        let mut doc = self.configure_document()?;
        doc.set_title(format!("FoodInsight - {}", layout.title));

        doc.push(
            Paragraph::new(layout.title.as_str())
                .styled(Style::new().bold().with_font_size(26).with_color(palette.primary.into())),
        );
        doc.push(Break::new(1));

        match self.photo_element(image) {
            Ok(photo) => {
                doc.push(photo);
                doc.push(Break::new(1));
            }
            Err(e) => warn!(error = %e, "photo could not be embedded; rendering without it"),
        }

        doc.push(
            Paragraph::new(layout.calories.as_str())
                .styled(Style::new().bold().with_font_size(20).with_color(palette.text_dark.into())),
        );
        if let Some(descriptor) = &layout.descriptor {
            doc.push(
                Paragraph::new(descriptor.as_str())
                    .styled(Style::new().with_font_size(10).with_color(palette.text_light.into())),
            );
        }
        doc.push(Break::new(0.5));
        doc.push(
            Paragraph::new(layout.badge.text())
                .styled(Style::new().bold().with_font_size(18).with_color(layout.badge.color.into())),
        );
        doc.push(Break::new(1));

        doc.push(self.heading("Macronutrient Breakdown"));
        doc.push(self.macro_table(&layout.macros)?);
        if let Some(split) = &layout.macro_split {
            doc.push(
                Paragraph::new(split.as_str())
                    .styled(Style::new().with_font_size(9).with_color(palette.text_light.into())),
            );
        }
        if let Some(allergens) = &layout.allergens {
            doc.push(Break::new(0.5));
            doc.push(
                Paragraph::new(allergens.as_str())
                    .styled(Style::new().bold().with_color(palette.warning.into())),
            );
        }

        for (heading, body) in [
            ("Nutritional Insight", &layout.insight),
            ("How to Make it Healthier", &layout.tip),
        ] {
            if let Some(body) = body {
                doc.push(Break::new(1));
                doc.push(self.heading(heading));
                doc.push(
                    Paragraph::new(body.as_str())
                        .styled(Style::new().with_font_size(11).with_color(palette.text_light.into())),
                );
            }
        }

        doc.push(Break::new(2));
        doc.push(
            Paragraph::new(layout.footer.as_str())
                .aligned(Alignment::Right)
                .styled(Style::new().with_font_size(8).with_color(palette.text_light.into())),
        );

        let mut out = Vec::new();
        doc.render(&mut out)?;
        debug!(bytes = out.len(), "report rendered");
        Ok(out)
    }

    fn configure_document(&self) -> Result<Document, RenderError> {
        let family =
            genpdf::fonts::from_files(&self.config.fonts_dir, &self.config.font_family, None)
                .map_err(|e| {
                    RenderError::Font(format!(
                        "{} in {}: {e}",
                        self.config.font_family,
                        self.config.fonts_dir.display()
                    ))
                })?;

        let mut doc = Document::new(family);
        doc.set_paper_size(match self.config.page_size {
            PageSize::Letter => PaperSize::Letter,
            PageSize::A4 => PaperSize::A4,
        });
        doc.set_font_size(11);
        doc.set_line_spacing(1.2);

        let mut decorator = SimplePageDecorator::new();
        decorator.set_margins(MARGIN_MM);
        doc.set_page_decorator(decorator);
        Ok(doc)
    }

    fn photo_element(&self, image: &[u8]) -> anyhow::Result<PdfImage> {
        let tmp = prepare_photo(image, PHOTO_MAX_W_PX, PHOTO_MAX_H_PX)?;
        let mut photo = PdfImage::from_path(tmp.path())?;
        photo.set_dpi(IMAGE_DPI);
        photo.set_alignment(Alignment::Center);
        Ok(photo)
    }

    fn heading(&self, text: &str) -> impl genpdf::Element {
        Paragraph::new(text).styled(
            Style::new()
                .bold()
                .with_font_size(14)
                .with_color(self.config.palette.text_dark.into()),
        )
    }

    fn macro_table(&self, rows: &[MacroRow; 3]) -> Result<TableLayout, RenderError> {
        let header = Style::new()
            .bold()
            .with_color(self.config.palette.primary.into());
        let cell = |text: String, style: Style| Paragraph::new(text).styled(style).padded(1);

        let mut table = TableLayout::new(vec![3, 2, 2]);
        table.set_cell_decorator(FrameCellDecorator::new(true, true, false));
        table
            .row()
            .element(cell("Nutrient".into(), header))
            .element(cell("Amount".into(), header))
            .element(cell("Your Daily Target".into(), header))
            .push()?;
        for row in rows {
            table
                .row()
                .element(cell(row.nutrient.into(), Style::new()))
                .element(cell(format!("{:.0}g", row.amount_g), Style::new()))
                .element(cell(format!("{:.0}g", row.target_g), Style::new()))
                .push()?;
        }
        Ok(table)
    }
}
