use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

fn classify_style() -> ProgressStyle {
    match ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:30.green/white} {pos}/{len} images {msg}")
    {
        Ok(style) => style.progress_chars("=>-"),
        Err(_) => ProgressStyle::default_bar(),
    }
}

/// Progress bar for a batch of images. Single-image runs draw nothing.
pub fn batch_bar(images: usize) -> ProgressBar {
    let bar = ProgressBar::new(images as u64);
    if images < 2 {
        bar.set_draw_target(ProgressDrawTarget::hidden());
    }
    bar.set_style(classify_style());
    bar
}
