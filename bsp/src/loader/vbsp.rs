use common::bounds::BoundingBox;
use flagset::FlagSet;
use glam::{Vec2, Vec3};

use crate::{
    bsp::{
        consts::{SurfFlags, MAX_LIGHTMAP_DIM_INCLUDING_BORDER},
        displacement::{BSPDispInfo, BSPDispVert, Displacement, DisplacementBuilder},
        edges::{resolve_face_vertices, BSPEdge, BSPSurfEdge},
        entities::parse_entities,
        environment::{
            leaf_ambient, parse_world_lights, AmbientSample, BSPCubemapSample, BSPLeafAmbientIndex,
            BSPLeafAmbientLighting, BSPLeafWaterData, Cubemap, LeafWater,
        },
        face::{style_count, BSPFace},
        gamelump::{parse_static_props, GameLumpDirectory, StaticProps, STATIC_PROPS_ID},
        header::LumpContainer,
        lightmap::{face_samples, LightingFormat},
        model::{face_owners, BSPModel, Model},
        overlay::{BSPOverlay, OverlayBuilder},
        plane::BSPPlane,
        textures::{BSPTexData, BSPTexDataStringTable, BSPTexInfo, Texture},
        tree::{BSPLeaf, BSPLeafFace, BSPLeafV0, BSPNode, Leaf, Node},
        vert::BSPVertex,
        visibility::{decode_rows, source_row_offsets, VisibilitySystem},
        LumpType, MapFormat,
    },
    config::BuildConfig,
    error::{BSPError, Result},
    meshes::{FaceInput, FaceLightmap, FaceShape, SurfaceBuilder},
    pacing::{Batches, Pacer},
};

use super::{lump_or_empty, BSPMap, Diagnostics};

/// Bumped faces store the flat lightmap followed by one per bump basis vector.
const BUMP_LIGHTMAPS: usize = 4;

struct FaceContext<'a> {
    planes: &'a [BSPPlane],
    vertices: &'a [BSPVertex],
    edges: &'a [BSPEdge],
    surfedges: &'a [BSPSurfEdge],
    texinfo: &'a [BSPTexInfo],
    textures: &'a [Texture],
    lighting: &'a [u8],
    dispinfo: &'a [BSPDispInfo],
    displacements: Option<DisplacementBuilder<'a>>,
}

/// A tessellated displacement waiting for its surface and leaves.
struct PendingDisplacement {
    face_index: usize,
    power: u32,
    bounds: BoundingBox,
}

/// HDR when asked for and present, or when it is the only lighting there is.
fn use_hdr(container: &LumpContainer, prefer_hdr: bool) -> bool {
    let ldr = container.has_lump(LumpType::Lighting);
    let hdr = container.has_lump(LumpType::LightingHdr);
    if prefer_hdr {
        hdr
    } else {
        hdr && !ldr
    }
}

/// The HDR variant of a lump when `hdr` is set and it has data.
fn pick(container: &LumpContainer, hdr: bool, ldr_id: LumpType, hdr_id: LumpType) -> LumpType {
    let has_hdr = container.has_lump(hdr_id);
    if (hdr && has_hdr) || (has_hdr && !container.has_lump(ldr_id)) {
        hdr_id
    } else {
        ldr_id
    }
}

pub(crate) fn load(
    container: &LumpContainer,
    config: &BuildConfig,
    pacer: &mut dyn Pacer,
) -> Result<BSPMap> {
    let mut diag = Diagnostics::default();
    let hdr = use_hdr(container, config.prefer_hdr);
    log::debug!("Using {} lighting", if hdr { "HDR" } else { "LDR" });

    let planes: Vec<BSPPlane> = diag.recover(container.decode(LumpType::Planes));
    let vertices: Vec<BSPVertex> = diag.recover(container.decode(LumpType::Vertexes));
    let edges: Vec<BSPEdge> = diag.recover(container.decode(LumpType::Edges));
    let surfedges: Vec<BSPSurfEdge> = diag.recover(container.decode(LumpType::SurfEdges));
    let texinfo: Vec<BSPTexInfo> = diag.recover(container.decode(LumpType::TexInfo));
    let faces: Vec<BSPFace> = diag.recover(container.decode(pick(
        container,
        hdr,
        LumpType::Faces,
        LumpType::FacesHdr,
    )));
    let models: Vec<Model> = diag
        .recover(container.decode::<BSPModel>(LumpType::Models))
        .into_iter()
        .map(Model::from)
        .collect();
    let lighting_id = if hdr {
        LumpType::LightingHdr
    } else {
        LumpType::Lighting
    };
    let lighting = lump_or_empty(&mut diag, container.get_lump(lighting_id));
    let dispinfo: Vec<BSPDispInfo> = diag.recover(container.decode(LumpType::DispInfo));
    let dispverts: Vec<BSPDispVert> = diag.recover(container.decode(LumpType::DispVerts));

    let textures = load_textures(container, &mut diag);

    let ctx = FaceContext {
        planes: &planes,
        vertices: &vertices,
        edges: &edges,
        surfedges: &surfedges,
        texinfo: &texinfo,
        textures: &textures,
        lighting: &lighting,
        dispinfo: &dispinfo,
        displacements: config
            .displacements
            .then(|| DisplacementBuilder::new(&dispverts)),
    };

    let owners = face_owners(&models, faces.len());
    let mut builder =
        SurfaceBuilder::new(config.lightmap_page_width, config.lightmap_page_height)?;
    let mut pending = Vec::new();
    let mut batches = Batches::new(pacer, config.yield_interval);
    for (i, face) in faces.iter().enumerate() {
        let input = match face_input(&ctx, i, face, owners[i], &mut diag) {
            Ok((input, displacement)) => {
                pending.extend(displacement);
                input
            }
            Err(e) => {
                diag.push(e);
                FaceInput::skipped(i, owners[i])
            }
        };
        builder.push_face(input)?;
        batches.tick("faces", i + 1, faces.len());
    }
    batches.finish("faces", faces.len());
    let built = builder.finish();

    let (visibility, raw_v0_leaves) = load_visibility(container, planes, &mut diag);

    let displacements = pending
        .into_iter()
        .map(|d| Displacement {
            face_index: d.face_index,
            power: d.power,
            surface: built.face_to_surface.get(d.face_index).copied().flatten(),
            mins: d.bounds.mins,
            maxs: d.bounds.maxs,
            leaves: visibility.leaves_in_box(d.bounds.mins, d.bounds.maxs),
        })
        .collect();

    let overlays = if config.overlays {
        let raw: Vec<BSPOverlay> = diag.recover(container.decode(LumpType::Overlays));
        let overlay_builder = OverlayBuilder::new(&built.mesh, &built.face_indices);
        let mut overlays = Vec::with_capacity(raw.len());
        for o in &raw {
            let name = texinfo_name(&texinfo, &textures, o.tex_info as i32);
            match overlay_builder.build(o, name) {
                Ok(overlay) => overlays.push(overlay),
                Err(e) => diag.push(e),
            }
        }
        overlays
    } else {
        Vec::new()
    };

    let leaf_faces = diag
        .recover(container.decode::<BSPLeafFace>(LumpType::LeafFaces))
        .into_iter()
        .map(|l| l.face)
        .collect();

    let world_lights_id = pick(container, hdr, LumpType::WorldLights, LumpType::WorldLightsHdr);
    let world_lights = {
        let bytes = lump_or_empty(&mut diag, container.get_lump(world_lights_id));
        let version = container.lump_version(world_lights_id).unwrap_or(0);
        diag.recover(parse_world_lights(world_lights_id, &bytes, version))
    };

    let cubemaps = diag
        .recover(container.decode::<BSPCubemapSample>(LumpType::Cubemaps))
        .into_iter()
        .map(Cubemap::from)
        .collect();
    let leaf_water = diag
        .recover(container.decode::<BSPLeafWaterData>(LumpType::LeafWaterData))
        .into_iter()
        .map(LeafWater::from)
        .collect();

    let ambient = match raw_v0_leaves {
        Some(v0) => inline_ambient(&v0, visibility.leaves()),
        None => load_leaf_ambient(container, hdr, visibility.leaves(), &mut diag),
    };

    let static_props = load_static_props(container, &mut diag);

    let entity_lump = lump_or_empty(&mut diag, container.get_lump(LumpType::Entities));
    let entities = diag.recover(parse_entities(&entity_lump, "Entities"));

    let mut map = BSPMap {
        format: Some(MapFormat::Source),
        version: container.version(),
        map_revision: container.map_revision(),
        visibility,
        leaf_faces,
        models,
        entities,
        textures,
        displacements,
        overlays,
        static_props,
        world_lights,
        cubemaps,
        leaf_water,
        leaf_ambient: ambient,
        hdr,
        ..Default::default()
    };
    map.apply(built);
    map.diagnostics = diag.into_inner();
    Ok(map)
}

/// TEXDATA names resolved through the string table.
fn load_textures(container: &LumpContainer, diag: &mut Diagnostics) -> Vec<Texture> {
    let texdata: Vec<BSPTexData> = diag.recover(container.decode(LumpType::TexData));
    let table: Vec<BSPTexDataStringTable> =
        diag.recover(container.decode(LumpType::TexDataStringTable));
    let strings = lump_or_empty(diag, container.get_lump(LumpType::TexDataStringData));

    let mut textures = Vec::with_capacity(texdata.len());
    for t in &texdata {
        let name = t.name(&table, &strings).unwrap_or_else(|e| {
            diag.push(e);
            String::new()
        });
        let (width, height) = (t.width, t.height);
        textures.push(Texture {
            name,
            width: width.max(0) as u32,
            height: height.max(0) as u32,
            rgba: None,
        });
    }
    log::debug!("{} texdata entries", textures.len());
    textures
}

fn texinfo_name(texinfo: &[BSPTexInfo], textures: &[Texture], index: i32) -> String {
    usize::try_from(index)
        .ok()
        .and_then(|i| texinfo.get(i))
        .and_then(|t| textures.get(usize::try_from(t.tex_data).ok()?))
        .map(|t| t.name.clone())
        .unwrap_or_default()
}

fn face_input(
    ctx: &FaceContext,
    index: usize,
    face: &BSPFace,
    model: usize,
    diag: &mut Diagnostics,
) -> Result<(FaceInput, Option<PendingDisplacement>)> {
    let tex_info = face.tex_info;
    let tex = usize::try_from(tex_info)
        .ok()
        .and_then(|t| ctx.texinfo.get(t))
        .ok_or_else(|| {
            BSPError::corrupt(
                "Faces",
                index,
                ctx.texinfo.len(),
                tex_info.unsigned_abs() as usize,
                "face references missing texinfo",
            )
        })?;
    let tex_data = tex.tex_data;
    let texture = usize::try_from(tex_data)
        .ok()
        .and_then(|t| ctx.textures.get(t))
        .ok_or_else(|| {
            BSPError::corrupt(
                "TexInfo",
                tex_info as usize,
                ctx.textures.len(),
                tex_data.unsigned_abs() as usize,
                "texinfo references missing texdata",
            )
        })?;

    let plane_num = face.plane_num;
    let plane = ctx.planes.get(plane_num as usize).ok_or_else(|| {
        BSPError::corrupt(
            "Faces",
            index,
            ctx.planes.len(),
            plane_num as usize,
            "face references missing plane",
        )
    })?;
    let normal = if face.side != 0 {
        -plane.normal
    } else {
        plane.normal
    };

    let points: Vec<Vec3> = resolve_face_vertices(
        face.first_edge,
        face.num_edges as i32,
        ctx.surfedges,
        ctx.edges,
        ctx.vertices.len(),
    )?
    .into_iter()
    .map(|v| ctx.vertices[v as usize].position())
    .collect();

    let flags = tex.flags();
    let hidden: FlagSet<SurfFlags> = SurfFlags::Sky
        | SurfFlags::Sky2D
        | SurfFlags::NoDraw
        | SurfFlags::Skip
        | SurfFlags::Hint
        | SurfFlags::Trigger;
    let skip = !flags.is_disjoint(hidden);

    let lightmap = if skip || flags.contains(SurfFlags::NoLight) || face.light_ofs < 0 {
        None
    } else {
        face_lightmap(ctx, index, face, tex, flags)
            .map_err(|e| diag.push(e))
            .ok()
    };

    let mut pending = None;
    let shape = match &ctx.displacements {
        Some(builder) if face.is_displacement() && !skip => {
            let disp_info = face.disp_info;
            let info = ctx.dispinfo.get(disp_info as usize).ok_or_else(|| {
                BSPError::corrupt(
                    "Faces",
                    index,
                    ctx.dispinfo.len(),
                    disp_info as usize,
                    "face references missing dispinfo",
                )
            })?;
            let mesh = builder.build(info, &points, normal)?;
            let mut bounds = BoundingBox::EMPTY;
            for &p in &mesh.positions {
                bounds.add_point(p);
            }
            pending = Some(PendingDisplacement {
                face_index: index,
                power: mesh.power,
                bounds,
            });
            mesh.into_shape()
        }
        _ => FaceShape::Polygon(points),
    };

    Ok((
        FaceInput {
            face_index: index,
            model,
            texture_name: texture.name.clone(),
            texture_size: texture.size(),
            normal,
            texture_vecs: tex.texture_vecs,
            lightmap,
            shape,
            skip,
            translucent: flags.contains(SurfFlags::Trans),
        },
        pending,
    ))
}

fn face_lightmap(
    ctx: &FaceContext,
    index: usize,
    face: &BSPFace,
    tex: &BSPTexInfo,
    flags: FlagSet<SurfFlags>,
) -> Result<FaceLightmap> {
    let styles = face.styles;
    let (width, height) = face.lightmap_extent().ok_or_else(|| {
        let size = face.lightmap_texture_size_in_luxels;
        BSPError::corrupt(
            "Faces",
            index,
            MAX_LIGHTMAP_DIM_INCLUDING_BORDER as usize,
            size[0].max(size[1]).unsigned_abs() as usize,
            "bad lightmap extents",
        )
    })?;
    let per_style = if flags.contains(SurfFlags::BumpLight) {
        BUMP_LIGHTMAPS
    } else {
        1
    };
    let samples = face_samples(
        ctx.lighting,
        face.light_ofs,
        (width * height) as usize,
        style_count(&styles) * per_style,
        LightingFormat::RgbExp32,
    )?;
    let mins = face.lightmap_texture_mins_in_luxels;

    Ok(FaceLightmap {
        vecs: tex.lightmap_vecs,
        scale: 1.0,
        mins: Vec2::new(mins[0] as f32, mins[1] as f32),
        width,
        height,
        styles,
        samples,
    })
}

/// Tree and PVS. Also hands back version 0 leaves, which carry their own ambient cube.
fn load_visibility(
    container: &LumpContainer,
    planes: Vec<BSPPlane>,
    diag: &mut Diagnostics,
) -> (VisibilitySystem, Option<Vec<BSPLeafV0>>) {
    let nodes: Vec<Node> = diag
        .recover(container.decode::<BSPNode>(LumpType::Nodes))
        .into_iter()
        .map(Node::from)
        .collect();

    let (leaves, v0): (Vec<Leaf>, _) = match container.lump_version(LumpType::Leafs) {
        Ok(0) => {
            let raw: Vec<BSPLeafV0> = diag.recover(container.decode(LumpType::Leafs));
            (raw.iter().copied().map(Leaf::from).collect(), Some(raw))
        }
        _ => {
            let raw: Vec<BSPLeaf> = diag.recover(container.decode(LumpType::Leafs));
            (raw.into_iter().map(Leaf::from).collect(), None)
        }
    };

    let vis = lump_or_empty(diag, container.get_lump(LumpType::Visibility));
    let offsets = diag.recover(source_row_offsets(&vis));
    let (rows, errors) = decode_rows(&vis, &offsets, offsets.len());
    diag.extend(errors);

    let visibility = VisibilitySystem::new(planes, nodes, leaves, rows).unwrap_or_else(|e| {
        diag.push(e);
        VisibilitySystem::default()
    });
    (visibility, v0)
}

/// One sample at the centre of each version 0 leaf.
fn inline_ambient(raw: &[BSPLeafV0], leaves: &[Leaf]) -> Vec<Vec<AmbientSample>> {
    raw.iter()
        .zip(leaves)
        .map(|(r, leaf)| {
            let cube = r.ambient_lighting;
            vec![AmbientSample {
                position: (leaf.mins + leaf.maxs) * 0.5,
                cube: cube.map(Vec3::from),
            }]
        })
        .collect()
}

fn load_leaf_ambient(
    container: &LumpContainer,
    hdr: bool,
    leaves: &[Leaf],
    diag: &mut Diagnostics,
) -> Vec<Vec<AmbientSample>> {
    let index_id = pick(
        container,
        hdr,
        LumpType::LeafAmbientIndex,
        LumpType::LeafAmbientIndexHdr,
    );
    let lighting_id = if index_id == LumpType::LeafAmbientIndexHdr {
        LumpType::LeafAmbientLightingHdr
    } else {
        LumpType::LeafAmbientLighting
    };
    let index: Vec<BSPLeafAmbientIndex> = diag.recover(container.decode(index_id));
    let lighting: Vec<BSPLeafAmbientLighting> = diag.recover(container.decode(lighting_id));
    diag.recover(leaf_ambient(&index, &lighting, leaves))
}

fn load_static_props(container: &LumpContainer, diag: &mut Diagnostics) -> Option<StaticProps> {
    let lump = lump_or_empty(diag, container.get_lump(LumpType::GameLump));
    if lump.is_empty() {
        return None;
    }
    let directory = diag.recover(GameLumpDirectory::parse(&lump));
    log::debug!(
        "Game lumps: {:?}",
        directory.entries.iter().map(|e| e.name()).collect::<Vec<_>>()
    );
    let entry = directory.find(STATIC_PROPS_ID)?;
    let version = entry.version;
    let result = directory
        .read(entry, container.data())
        .and_then(|data| parse_static_props(&data, version));
    match result {
        Ok(props) => Some(props),
        Err(e) => {
            diag.push(e);
            None
        }
    }
}
