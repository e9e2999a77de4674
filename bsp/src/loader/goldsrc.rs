use glam::{Vec2, Vec3};

use crate::{
    bsp::{
        consts::{GOLDSRC_LUXEL_SIZE, GOLDSRC_TEX_SPECIAL},
        edges::{resolve_face_vertices, BSPEdge, BSPSurfEdge},
        entities::parse_entities,
        face::{style_count, GoldSrcFace},
        header::LumpContainer,
        lightmap::{face_samples, LightingFormat},
        model::{face_owners, GoldSrcModel, Model},
        plane::BSPPlane,
        textures::{parse_miptex_lump, GoldSrcTexInfo, Texture},
        tree::{BSPLeafFace, GoldSrcLeaf, GoldSrcNode, Leaf, Node},
        vert::BSPVertex,
        visibility::{decode_rows, RowOffset, VisibilitySystem},
        GoldSrcLump, MapFormat,
    },
    config::BuildConfig,
    error::{BSPError, Result},
    meshes::{project_uv, FaceInput, FaceLightmap, FaceShape, SurfaceBuilder},
    pacing::{Batches, Pacer},
};

use super::{lump_or_empty, BSPMap, Diagnostics};

/// GoldSrc surfaces wider than this many luxels are rejected by the engine.
const MAX_SURFACE_EXTENT: u32 = 256;

/// Geometry lumps shared by every face.
struct FaceContext<'a> {
    planes: &'a [BSPPlane],
    vertices: &'a [BSPVertex],
    edges: &'a [BSPEdge],
    surfedges: &'a [BSPSurfEdge],
    texinfo: &'a [GoldSrcTexInfo],
    textures: &'a [Texture],
    lighting: &'a [u8],
}

pub(crate) fn load(
    container: &LumpContainer,
    config: &BuildConfig,
    pacer: &mut dyn Pacer,
) -> Result<BSPMap> {
    let mut diag = Diagnostics::default();

    let planes: Vec<BSPPlane> = diag.recover(container.decode(GoldSrcLump::Planes));
    let vertices: Vec<BSPVertex> = diag.recover(container.decode(GoldSrcLump::Vertexes));
    let edges: Vec<BSPEdge> = diag.recover(container.decode(GoldSrcLump::Edges));
    let surfedges: Vec<BSPSurfEdge> = diag.recover(container.decode(GoldSrcLump::SurfEdges));
    let texinfo: Vec<GoldSrcTexInfo> = diag.recover(container.decode(GoldSrcLump::TexInfo));
    let faces: Vec<GoldSrcFace> = diag.recover(container.decode(GoldSrcLump::Faces));
    let models: Vec<Model> = diag
        .recover(container.decode::<GoldSrcModel>(GoldSrcLump::Models))
        .into_iter()
        .map(Model::from)
        .collect();
    let lighting = lump_or_empty(&mut diag, container.get_lump(GoldSrcLump::Lighting));

    let textures_lump = lump_or_empty(&mut diag, container.get_lump(GoldSrcLump::Textures));
    let (textures, texture_errors) = diag.recover(parse_miptex_lump(&textures_lump));
    diag.extend(texture_errors);

    let ctx = FaceContext {
        planes: &planes,
        vertices: &vertices,
        edges: &edges,
        surfedges: &surfedges,
        texinfo: &texinfo,
        textures: &textures,
        lighting: &lighting,
    };

    let owners = face_owners(&models, faces.len());
    let mut builder =
        SurfaceBuilder::new(config.lightmap_page_width, config.lightmap_page_height)?;
    let mut batches = Batches::new(pacer, config.yield_interval);
    for (i, face) in faces.iter().enumerate() {
        let input = face_input(&ctx, i, face, owners[i], &mut diag).unwrap_or_else(|e| {
            diag.push(e);
            FaceInput::skipped(i, owners[i])
        });
        builder.push_face(input)?;
        batches.tick("faces", i + 1, faces.len());
    }
    batches.finish("faces", faces.len());

    let visibility = load_visibility(container, planes, &models, &mut diag);

    let leaf_faces = diag
        .recover(container.decode::<BSPLeafFace>(GoldSrcLump::MarkSurfaces))
        .into_iter()
        .map(|l| l.face)
        .collect();

    let entity_lump = lump_or_empty(&mut diag, container.get_lump(GoldSrcLump::Entities));
    let entities = diag.recover(parse_entities(&entity_lump, "Entities"));

    let mut map = BSPMap {
        format: Some(MapFormat::GoldSrc),
        version: container.version(),
        visibility,
        leaf_faces,
        models,
        entities,
        textures,
        ..Default::default()
    };
    map.apply(builder.finish());
    map.diagnostics = diag.into_inner();
    Ok(map)
}

fn face_input(
    ctx: &FaceContext,
    index: usize,
    face: &GoldSrcFace,
    model: usize,
    diag: &mut Diagnostics,
) -> Result<FaceInput> {
    let tex = ctx.texinfo.get(face.tex_info as usize).ok_or_else(|| {
        BSPError::corrupt(
            "Faces",
            index,
            ctx.texinfo.len(),
            face.tex_info as usize,
            "face references missing texinfo",
        )
    })?;
    let miptex = tex.miptex;
    let texture = usize::try_from(miptex)
        .ok()
        .and_then(|m| ctx.textures.get(m))
        .ok_or_else(|| {
            BSPError::corrupt(
                "TexInfo",
                face.tex_info as usize,
                ctx.textures.len(),
                miptex.unsigned_abs() as usize,
                "texinfo references missing texture",
            )
        })?;

    let plane = ctx.planes.get(face.plane_num as usize).ok_or_else(|| {
        BSPError::corrupt(
            "Faces",
            index,
            ctx.planes.len(),
            face.plane_num as usize,
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

    let vecs = tex.vecs;
    let special = tex.flags & GOLDSRC_TEX_SPECIAL != 0;
    let skip = texture.is_goldsrc_nodraw();

    let lightmap = if special || skip || face.light_ofs < 0 || style_count(&face.styles) == 0 {
        None
    } else {
        face_lightmap(ctx, face, &vecs, &points)
            .map_err(|e| diag.push(e))
            .ok()
    };

    Ok(FaceInput {
        face_index: index,
        model,
        texture_name: texture.name.clone(),
        texture_size: texture.size(),
        normal,
        texture_vecs: vecs,
        lightmap,
        shape: FaceShape::Polygon(points),
        skip,
        translucent: false,
    })
}

/// Luxel rectangle from the face's texture space extents, one luxel per 16 texels.
fn face_lightmap(
    ctx: &FaceContext,
    face: &GoldSrcFace,
    vecs: &[[f32; 4]; 2],
    points: &[Vec3],
) -> Result<FaceLightmap> {
    let mut min = Vec2::splat(f32::MAX);
    let mut max = Vec2::splat(f32::MIN);
    for &p in points {
        let uv = project_uv(p, vecs);
        min = min.min(uv);
        max = max.max(uv);
    }
    let mins = (min / GOLDSRC_LUXEL_SIZE).floor();
    let size = (max / GOLDSRC_LUXEL_SIZE).ceil() - mins + Vec2::ONE;
    if !size.is_finite() || size.x > MAX_SURFACE_EXTENT as f32 || size.y > MAX_SURFACE_EXTENT as f32 {
        return Err(BSPError::corrupt(
            "Faces",
            face.first_edge.max(0) as usize,
            MAX_SURFACE_EXTENT as usize,
            size.max_element().max(0.0) as usize,
            "bad surface extents",
        ));
    }
    let (width, height) = (size.x as u32, size.y as u32);

    let styles = face.styles;
    let samples = face_samples(
        ctx.lighting,
        face.light_ofs,
        (width * height) as usize,
        style_count(&styles),
        LightingFormat::Rgb8,
    )?;

    Ok(FaceLightmap {
        vecs: *vecs,
        scale: 1.0 / GOLDSRC_LUXEL_SIZE,
        mins,
        width,
        height,
        styles,
        samples,
    })
}

/// Every leaf but leaf 0 is a cluster, up to the world model's vis leaf count.
fn load_visibility(
    container: &LumpContainer,
    planes: Vec<BSPPlane>,
    models: &[Model],
    diag: &mut Diagnostics,
) -> VisibilitySystem {
    let nodes: Vec<Node> = diag
        .recover(container.decode::<GoldSrcNode>(GoldSrcLump::Nodes))
        .into_iter()
        .map(Node::from)
        .collect();
    let raw_leaves: Vec<GoldSrcLeaf> = diag.recover(container.decode(GoldSrcLump::Leafs));
    let leaves: Vec<Leaf> = raw_leaves
        .iter()
        .enumerate()
        .map(|(i, l)| Leaf::from_goldsrc(i, *l))
        .collect();

    let vis = lump_or_empty(diag, container.get_lump(GoldSrcLump::Visibility));
    let rows = if vis.is_empty() {
        Vec::new()
    } else {
        let max_clusters = raw_leaves.len().saturating_sub(1);
        let num_clusters = models
            .first()
            .map_or(max_clusters, |m| m.vis_leaves)
            .min(max_clusters);
        let offsets: Vec<RowOffset> = raw_leaves
            .iter()
            .skip(1)
            .take(num_clusters)
            .map(|l| RowOffset::goldsrc(l.visofs))
            .collect();
        let (rows, errors) = decode_rows(&vis, &offsets, num_clusters);
        diag.extend(errors);
        rows
    };

    VisibilitySystem::new(planes, nodes, leaves, rows).unwrap_or_else(|e| {
        diag.push(e);
        VisibilitySystem::default()
    })
}

#[cfg(test)]
mod goldsrc_tests {
    use bytemuck::Zeroable;

    use super::*;
    use crate::{
        bsp::{
            test_util::{pod_bytes, MapWriter},
            textures::textures_tests::miptex_lump,
        },
        loader::parse_with_pacer,
        parse,
    };

    const IDENTITY: [[f32; 4]; 2] = [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]];

    fn lump(id: GoldSrcLump) -> usize {
        id as usize
    }

    /// One textured unit square on z = 0 facing up, in a single visible leaf.
    fn square_map(texture: &str, lighting: Vec<u8>) -> MapWriter {
        let vertices = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
        ]
        .map(|position| BSPVertex { position });
        let edges = [[0, 0], [0, 1], [1, 2], [2, 3], [3, 0]].map(|v| BSPEdge { v });
        let surfedges = [1, 2, 3, 4].map(|index| BSPSurfEdge { index });
        let texinfo = GoldSrcTexInfo {
            vecs: IDENTITY,
            miptex: 0,
            flags: 0,
        };
        let face = GoldSrcFace {
            plane_num: 0,
            side: 0,
            first_edge: 0,
            num_edges: 4,
            tex_info: 0,
            styles: [0, 255, 255, 255],
            light_ofs: 0,
        };
        let world = GoldSrcModel {
            numfaces: 1,
            visleafs: 1,
            ..Zeroable::zeroed()
        };
        let node = GoldSrcNode {
            planenum: 0,
            children: [-2, -1],
            ..Zeroable::zeroed()
        };
        let solid = GoldSrcLeaf {
            contents: -2,
            visofs: -1,
            ..Zeroable::zeroed()
        };
        let open = GoldSrcLeaf {
            contents: -1,
            visofs: 0,
            nummarksurfaces: 1,
            ..Zeroable::zeroed()
        };

        MapWriter::goldsrc()
            .lump(
                lump(GoldSrcLump::Entities),
                b"{\n\"classname\" \"worldspawn\"\n\"wad\" \"halflife.wad\"\n}\n\0".to_vec(),
            )
            .lump(lump(GoldSrcLump::Planes), pod_bytes(&[BSPPlane::new(Vec3::Z, 0.0)]))
            .lump(lump(GoldSrcLump::Textures), miptex_lump(&[(texture, false)]))
            .lump(lump(GoldSrcLump::Vertexes), pod_bytes(&vertices))
            .lump(lump(GoldSrcLump::Visibility), vec![0b1])
            .lump(lump(GoldSrcLump::Nodes), pod_bytes(&[node]))
            .lump(lump(GoldSrcLump::TexInfo), pod_bytes(&[texinfo]))
            .lump(lump(GoldSrcLump::Faces), pod_bytes(&[face]))
            .lump(lump(GoldSrcLump::Lighting), lighting)
            .lump(lump(GoldSrcLump::Leafs), pod_bytes(&[solid, open]))
            .lump(lump(GoldSrcLump::MarkSurfaces), pod_bytes(&[BSPLeafFace { face: 0 }]))
            .lump(lump(GoldSrcLump::Edges), pod_bytes(&edges))
            .lump(lump(GoldSrcLump::SurfEdges), pod_bytes(&surfedges))
            .lump(lump(GoldSrcLump::Models), pod_bytes(&[world]))
    }

    #[test]
    fn single_face_map() {
        let bytes = square_map("test", vec![100; 12]).build();
        let map = parse(&bytes, &BuildConfig::default()).unwrap();

        assert!(map.diagnostics.is_empty(), "{:?}", map.diagnostics);
        assert_eq!(map.format, Some(MapFormat::GoldSrc));
        assert_eq!(map.surfaces.len(), 1);
        let surface = &map.surfaces[0];
        assert_eq!(surface.texture_name, "test");
        assert_eq!(surface.index_count, 6);
        assert_eq!(surface.lightmap_allocations.len(), 1);
        let alloc = &surface.lightmap_allocations[0];
        assert_eq!((alloc.page, alloc.x, alloc.y), (0, 0, 0));
        // the unit square spans luxels 0..=1 on both axes
        assert_eq!((alloc.width, alloc.height), (2, 2));
        assert_eq!(map.pages.len(), 1);

        // texture coordinates are normalised by the 16x16 miptex
        assert_eq!(map.mesh.vertices[2].uv, Vec2::new(1.0 / 16.0, 1.0 / 16.0));
        assert_eq!(map.entities[0].wads(), vec!["halflife.wad".to_owned()]);
    }

    #[test]
    fn surfaces_follow_the_pvs() {
        let bytes = square_map("test", vec![100; 12]).build();
        let map = parse(&bytes, &BuildConfig::default()).unwrap();

        assert_eq!(map.visibility.num_clusters(), 1);
        assert_eq!(map.visibility.point_leaf(Vec3::new(0.5, 0.5, 8.0)), Some(1));
        assert_eq!(map.leaf_surfaces(1), vec![0]);
        assert_eq!(map.visible_surfaces(Vec3::new(0.5, 0.5, 8.0)), vec![0]);
        assert_eq!(map.model_leaf(0, Vec3::new(0.5, 0.5, -8.0)), Some(0));
        assert_eq!(map.model_leaf(1, Vec3::ZERO), None);
        // below the plane is the solid leaf, outside every cluster
        assert!(map.leaf_surfaces(0).is_empty());
    }

    #[test]
    fn nodraw_texture_builds_nothing() {
        let bytes = square_map("aaatrigger", vec![100; 12]).build();
        let map = parse(&bytes, &BuildConfig::default()).unwrap();
        assert!(map.surfaces.is_empty());
        assert_eq!(map.skipped_faces, 1);
        assert_eq!(map.face_to_surface, vec![None]);
    }

    #[test]
    fn short_lighting_keeps_geometry() {
        let bytes = square_map("test", vec![100; 5]).build();
        let map = parse(&bytes, &BuildConfig::default()).unwrap();
        assert_eq!(map.surfaces.len(), 1);
        assert!(map.surfaces[0].lightmap_allocations.is_empty());
        assert_eq!(map.diagnostics.len(), 1);
        assert!(map.pages.is_empty());
    }

    #[test]
    fn broken_lump_is_a_diagnostic() {
        // 7 bytes is not a whole number of 20 byte planes
        let bytes = square_map("test", vec![100; 12])
            .lump(lump(GoldSrcLump::Planes), vec![0; 7])
            .build();
        let map = parse(&bytes, &BuildConfig::default()).unwrap();
        assert!(map.surfaces.is_empty());
        assert!(matches!(
            map.diagnostics[0],
            BSPError::CorruptData { .. }
        ));
    }

    #[test]
    fn broken_textures_keep_the_tree() {
        // too short for even the texture count
        let bytes = square_map("test", vec![100; 12])
            .lump(lump(GoldSrcLump::Textures), vec![1, 0, 0])
            .build();
        let map = parse(&bytes, &BuildConfig::default()).unwrap();

        // the face lost its texture, the leaves and PVS did not
        assert!(map.surfaces.is_empty());
        assert_eq!(map.visibility.num_clusters(), 1);
        assert_eq!(map.visibility.point_leaf(Vec3::new(0.5, 0.5, 8.0)), Some(1));
        assert_eq!(map.leaf_faces, vec![0]);
        assert_eq!(map.diagnostics.len(), 2);
        assert!(map
            .diagnostics
            .iter()
            .all(|e| matches!(e, BSPError::CorruptData { .. })));
    }

    #[test]
    fn pacer_hears_about_faces() {
        let bytes = square_map("test", vec![100; 12]).build();
        let mut calls = Vec::new();
        let mut record = |stage: &str, done: usize, total: usize| {
            calls.push((stage.to_owned(), done, total));
        };
        let config = BuildConfig {
            yield_interval: 1,
            ..Default::default()
        };
        parse_with_pacer(&bytes, &config, &mut record).unwrap();
        assert_eq!(calls, vec![("faces".to_owned(), 1, 1), ("faces".to_owned(), 1, 1)]);
    }
}
