//! Volume Mesher CLI
//!
//! Convert, segment and mesh large 3D scan volumes block by block.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use volume_mesher::{
    archive_combined_meshes, combine_directory, export_to_chunked, export_to_image_stack, ArrayMetadata,
    CacheSize, ChunkedMesher, ChunkedSegmentationWriter, ChunkedVolume, ConnectedComponentsSegmenter,
    DataType, ImageStackVolume, MeshFormat, PipelineConfig, Progress, Shape, Segmenter,
    ThresholdSegmenter, VolumeProvider, Voxel,
};

#[derive(Parser)]
#[command(name = "volume-mesher")]
#[command(author, version, about = "Segment and mesh large 3D scan volumes", long_about = None)]
struct Cli {
    /// Pipeline configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an image stack into a chunked store
    Convert {
        /// Directory holding one image per Z slice
        #[arg(short, long)]
        input: PathBuf,

        /// File name pattern of the slices
        #[arg(short, long, default_value = "*")]
        pattern: String,

        /// Output chunked store
        #[arg(short, long)]
        output: PathBuf,

        /// Voxel type of the output
        #[arg(long, value_enum, default_value = "u8")]
        dtype: VoxelType,

        /// Chunk size as z,y,x
        #[arg(long, value_parser = parse_shape)]
        chunk_size: Option<Shape>,

        /// Keep every n-th voxel per axis, as z,y,x
        #[arg(long, value_parser = parse_shape, default_value = "1,1,1")]
        downsample: Shape,
    },

    /// Segment a chunked store into a chunked label store
    Segment {
        /// Input chunked store
        #[arg(short, long)]
        input: PathBuf,

        /// Output label store
        #[arg(short, long)]
        output: PathBuf,

        /// Voxels above this value are foreground
        #[arg(short, long)]
        threshold: f64,

        /// Label connected components per slice instead of a single label
        #[arg(long)]
        components: bool,

        /// Block size as z,y,x
        #[arg(long, value_parser = parse_shape)]
        block_size: Option<Shape>,

        /// Number of blocks processed concurrently
        #[arg(long)]
        parallelism: Option<usize>,
    },

    /// Mesh every object of a label store
    Mesh {
        /// Input label store
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory for fragments and combined meshes
        #[arg(short, long)]
        output: PathBuf,

        /// Block size as z,y,x
        #[arg(long, value_parser = parse_shape)]
        block_size: Option<Shape>,

        /// Write fragments in volume coordinates instead of block-local ones
        #[arg(long)]
        volume_coordinates: bool,

        /// Also write combined meshes as GLB
        #[arg(long)]
        glb: bool,
    },

    /// Combine the fragments already present in a directory
    Combine {
        /// Directory of fragments
        #[arg(short, long)]
        dir: PathBuf,

        /// Output formats
        #[arg(short, long, value_enum, value_delimiter = ',', default_value = "obj,stl")]
        formats: Vec<OutputFormat>,
    },

    /// Write a chunked store as one PNG per Z slice
    ExportPng {
        /// Input chunked store
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Zip the combined meshes of a directory
    Archive {
        /// Directory of combined meshes
        #[arg(short, long)]
        dir: PathBuf,

        /// Output zip file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show information about a chunked store
    Info {
        /// Chunked store
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum VoxelType {
    U8,
    U16,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Wavefront OBJ
    Obj,
    /// Binary STL
    Stl,
    /// Binary glTF
    Glb,
}

impl From<OutputFormat> for MeshFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Obj => MeshFormat::Obj,
            OutputFormat::Stl => MeshFormat::Stl,
            OutputFormat::Glb => MeshFormat::Glb,
        }
    }
}

fn parse_shape(s: &str) -> Result<Shape, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("Invalid shape: '{}'. Use z,y,x", s));
    }
    let mut shape = [0usize; 3];
    for (value, part) in shape.iter_mut().zip(parts) {
        *value = part.parse().map_err(|_| format!("Invalid axis size: '{}'", part))?;
    }
    Ok(shape)
}

/// Run a generic function with the voxel type stored in a chunked store.
macro_rules! dispatch_dtype {
    ($dtype:expr, $func:ident($($arg:expr),*)) => {
        match $dtype {
            DataType::U8 => $func::<u8>($($arg),*),
            DataType::U16 => $func::<u16>($($arg),*),
            DataType::U32 => $func::<u32>($($arg),*),
            DataType::U64 => $func::<u64>($($arg),*),
            DataType::F32 => $func::<f32>($($arg),*),
        }
    };
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Convert {
            input,
            pattern,
            output,
            dtype,
            chunk_size,
            downsample,
        } => {
            let mut options = config.export_options().with_downsample(downsample);
            if let Some(chunk_size) = chunk_size {
                options = options.with_chunk_size(chunk_size);
            }
            match dtype {
                VoxelType::U8 => convert::<u8>(&input, &pattern, &output, config.image_cache, &options)?,
                VoxelType::U16 => convert::<u16>(&input, &pattern, &output, config.image_cache, &options)?,
            }
        }
        Commands::Segment {
            input,
            output,
            threshold,
            components,
            block_size,
            parallelism,
        } => {
            let mut seg_config = config.segmentation();
            if let Some(block_size) = block_size {
                seg_config = seg_config.with_block_size(block_size);
            }
            if let Some(parallelism) = parallelism {
                seg_config = seg_config.with_parallelism(parallelism);
            }
            let writer = ChunkedSegmentationWriter::new(seg_config);
            let dtype = ArrayMetadata::load(&input)?.data_type()?;
            dispatch_dtype!(dtype, segment(&writer, &input, &output, threshold, components))?;
        }
        Commands::Mesh {
            input,
            output,
            block_size,
            volume_coordinates,
            glb,
        } => {
            let mut mesh_config = config.meshing().with_volume_coordinates(volume_coordinates);
            if let Some(block_size) = block_size {
                mesh_config = mesh_config.with_block_size(block_size);
            }
            if glb && !mesh_config.combined_formats.contains(&MeshFormat::Glb) {
                mesh_config.combined_formats.push(MeshFormat::Glb);
            }
            let dtype = ArrayMetadata::load(&input)?.data_type()?;
            dispatch_dtype!(dtype, mesh(&input, &output, mesh_config))?;
        }
        Commands::Combine { dir, formats } => {
            let formats: Vec<MeshFormat> = formats.into_iter().map(MeshFormat::from).collect();
            let report = combine_directory(&dir, &formats, config.meshing_parallelism)?;
            println!(
                "Combined {} objects ({} skipped, {} failed)",
                report.combined.len(),
                report.skipped.len(),
                report.failed.len()
            );
            for (id, error) in &report.failed {
                println!("  Object {}: {}", id, error);
            }
        }
        Commands::ExportPng { input, output } => {
            let dtype = ArrayMetadata::load(&input)?.data_type()?;
            let written = dispatch_dtype!(dtype, export_png(&input, &output, config.segmentation_parallelism))?;
            println!("Exported {} slices to {:?}", written, output);
        }
        Commands::Archive { dir, output } => {
            let count = archive_combined_meshes(&dir, &output)?;
            println!("Archived {} meshes to {:?}", count, output);
        }
        Commands::Info { input } => {
            show_store_info(&input)?;
        }
    }

    Ok(())
}

fn print_progress(progress: Progress) {
    println!(
        "  {}/{} ({:.0}%)",
        progress.completed,
        progress.total,
        progress.fraction() * 100.0
    );
}

fn convert<T: Voxel>(
    input: &Path,
    pattern: &str,
    output: &Path,
    cache: CacheSize,
    options: &volume_mesher::ExportOptions,
) -> volume_mesher::Result<()> {
    println!("Reading image stack from {:?}...", input);
    let stack = ImageStackVolume::<T>::from_directory(input, pattern, cache)?;
    println!("  Found {} slices of {}x{}", stack.shape()[0], stack.shape()[2], stack.shape()[1]);

    let source = VolumeProvider::from(stack);
    let array = export_to_chunked(&source, output, options, Some(&print_progress))?;
    println!("Wrote {:?} array to {:?}", array.shape(), output);
    Ok(())
}

fn segment<T: Voxel>(
    writer: &ChunkedSegmentationWriter,
    input: &Path,
    output: &Path,
    threshold: f64,
    components: bool,
) -> volume_mesher::Result<()> {
    let source = VolumeProvider::from(ChunkedVolume::<T>::open(input)?);
    let segmenter: Box<dyn Segmenter<T>> = if components {
        Box::new(ConnectedComponentsSegmenter::new(threshold))
    } else {
        Box::new(ThresholdSegmenter::new(threshold))
    };

    println!("Segmenting {:?} ({:?})...", input, source.shape());
    let labels = writer.run(&source, output, segmenter.as_ref(), Some(&print_progress))?;
    println!("Wrote labels to {:?} ({} chunks stored)", output, labels.stored_chunk_count()?);
    Ok(())
}

fn mesh<T: Voxel>(input: &Path, output: &Path, config: volume_mesher::MeshingConfig) -> volume_mesher::Result<()> {
    let labels = VolumeProvider::from(ChunkedVolume::<T>::open(input)?);
    println!("Meshing {:?} ({:?}) with block size {:?}...", input, labels.shape(), config.block_size);

    let report = ChunkedMesher::new(&labels, output, config).run(Some(&print_progress))?;
    println!(
        "Meshed {} blocks into {} fragments; {} objects combined, {} skipped, {} failed",
        report.blocks,
        report.fragments,
        report.combined.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for (id, error) in &report.failed {
        println!("  Object {}: {}", id, error);
    }
    Ok(())
}

fn export_png<T: Voxel>(input: &Path, output: &Path, parallelism: usize) -> volume_mesher::Result<usize> {
    let source = VolumeProvider::from(ChunkedVolume::<T>::open(input)?);
    Ok(export_to_image_stack(&source, output, parallelism)?.len())
}

fn show_store_info(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let metadata = ArrayMetadata::load(input)?;
    let dtype = metadata.data_type()?;
    println!("Chunked store {:?}:", input);
    println!("  Shape: {:?}", metadata.shape);
    println!("  Chunks: {:?}", metadata.chunks);
    println!("  Data type: {}", dtype);
    println!("  Fill value: {}", metadata.fill_value);
    let stored = dispatch_dtype!(dtype, stored_chunks(input))?;
    println!("  Stored chunks: {}", stored);
    Ok(())
}

fn stored_chunks<T: Voxel>(input: &Path) -> volume_mesher::Result<usize> {
    ChunkedVolume::<T>::open(input)?.array().stored_chunk_count()
}
