use console::Style;
use steady_core::pipeline::{RegistrationConfig, SessionRecord};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    warning: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            warning: Style::new().yellow().bold(),
            path: Style::new().underlined(),
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

pub fn print_config_summary(config: &RegistrationConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Steady Registration"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(19)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Save path"),
        s.path.apply_to(config.save_path.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Frame"),
        s.value.apply_to(format!("{}x{}", config.ly, config.lx))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Channels"),
        s.value.apply_to(format!(
            "{} (functional {}, align by {})",
            config.nchannels, config.functional_chan, config.align_by_chan
        ))
    );
    println!();

    println!("  {}", s.header.apply_to("Alignment"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Rigid"),
        s.value.apply_to(format!("max shift {:.0}%", config.maxregshift * 100.0))
    );
    if config.nonrigid {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Nonrigid"),
            s.method.apply_to(format!(
                "{}x{} blocks, max {} px",
                config.block_size[0], config.block_size[1], config.maxregshift_nr
            ))
        );
    } else {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Nonrigid"),
            s.disabled.apply_to("disabled")
        );
    }
    let bidi = if config.bidiphase != 0.0 {
        format!("fixed {:.2} px", config.bidiphase)
    } else {
        on_off(config.do_bidiphase).to_string()
    };
    println!("    {:<12}{}", s.label.apply_to("Bidiphase"), s.value.apply_to(bidi));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Reference"),
        s.value.apply_to(format!("{} frames", config.nimg_init))
    );
    println!();

    println!("  {}", s.header.apply_to("Output"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Batch"),
        s.value.apply_to(format!("{} frames", config.batch_size))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Keep raw"),
        s.value.apply_to(on_off(config.keep_movie_raw))
    );
    println!(
        "    {:<12}{} / {}",
        s.label.apply_to("Previews"),
        s.value.apply_to(on_off(config.reg_tif)),
        s.value.apply_to(on_off(config.reg_tif_chan2))
    );
    println!();
}

pub fn print_record_summary(record: &SessionRecord) {
    let s = Styles::new();
    let offsets = &record.offsets;
    let n = offsets.len().max(1) as f32;
    let mean_abs = |v: &ndarray::Array1<f32>| v.iter().map(|x| x.abs()).sum::<f32>() / n;
    let max_abs = |v: &ndarray::Array1<f32>| v.iter().fold(0.0f32, |m, x| m.max(x.abs()));

    println!();
    println!("  {}", s.header.apply_to("Result"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Frames"),
        s.value.apply_to(record.nframes)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Bidiphase"),
        s.value.apply_to(format!("{:.2} px", record.bidiphase))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Shift y"),
        s.value.apply_to(format!(
            "mean {:.2} px, max {:.2} px",
            mean_abs(&offsets.yoff),
            max_abs(&offsets.yoff)
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Shift x"),
        s.value.apply_to(format!(
            "mean {:.2} px, max {:.2} px",
            mean_abs(&offsets.xoff),
            max_abs(&offsets.xoff)
        ))
    );
    if let Some(grid) = &record.blocks {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Blocks"),
            s.method.apply_to(format!("{}x{}", grid.ny, grid.nx))
        );
    }
    let crop = &record.crop;
    let crop_text = format!(
        "y {}..{}, x {}..{}",
        crop.y_lo, crop.y_hi, crop.x_lo, crop.x_hi
    );
    if crop.is_degenerate() {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Valid"),
            s.warning.apply_to(format!("{crop_text} (degenerate)"))
        );
    } else {
        println!("    {:<12}{}", s.label.apply_to("Valid"), s.value.apply_to(crop_text));
    }
    let bad = record.bad_frame_count();
    let bad_style = if bad * 2 > record.nframes { &s.warning } else { &s.value };
    println!(
        "    {:<12}{}",
        s.label.apply_to("Bad frames"),
        bad_style.apply_to(bad)
    );
    println!();
}
